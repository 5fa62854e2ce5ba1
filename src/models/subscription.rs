use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// SubscriptionType
///
/// The kinds of email notification a user can opt in or out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SubscriptionType {
    Reply,
    Mention,
    Moderation,
}

impl SubscriptionType {
    pub const ALL: [SubscriptionType; 3] = [
        SubscriptionType::Reply,
        SubscriptionType::Mention,
        SubscriptionType::Moderation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Reply => "reply",
            SubscriptionType::Mention => "mention",
            SubscriptionType::Moderation => "moderation",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown subscription type '{0}'")]
pub struct UnknownSubscriptionType(pub String);

impl TryFrom<String> for SubscriptionType {
    type Error = UnknownSubscriptionType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SubscriptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or(UnknownSubscriptionType(value))
    }
}

/// Subscription
///
/// Permission from a user to send one type of communication, stored in the
/// `subscriptions` table. `uri` is the subscriber, currently always a fully
/// qualified user id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct Subscription {
    pub id: i32,
    pub uri: String,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub subscription_type: SubscriptionType,
    pub active: bool,
}
