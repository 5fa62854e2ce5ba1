use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{Subscription, SubscriptionType},
    services::subscriptions,
};

/// SubscriptionsUpdate
///
/// Body of `PATCH /api/profile/subscriptions`. Omitted types keep their state.
#[derive(Debug, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SubscriptionsUpdate {
    pub reply: Option<bool>,
    pub mention: Option<bool>,
    pub moderation: Option<bool>,
}

impl SubscriptionsUpdate {
    fn toggles(&self) -> [(SubscriptionType, Option<bool>); 3] {
        [
            (SubscriptionType::Reply, self.reply),
            (SubscriptionType::Mention, self.mention),
            (SubscriptionType::Moderation, self.moderation),
        ]
    }
}

/// get_subscriptions
///
/// [Authenticated Route] The requester's subscription preferences, one per
/// type. Missing rows are created active.
#[utoipa::path(
    get,
    path = "/api/profile/subscriptions",
    responses((status = 200, description = "Subscriptions", body = [Subscription]))
)]
pub async fn get_subscriptions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let subscriptions = subscriptions::get_all(state.repo.as_ref(), &user.userid()).await?;
    Ok(Json(subscriptions))
}

#[utoipa::path(
    patch,
    path = "/api/profile/subscriptions",
    request_body = SubscriptionsUpdate,
    responses((status = 200, description = "Subscriptions", body = [Subscription]))
)]
pub async fn update_subscriptions(
    user: AuthUser,
    State(state): State<AppState>,
    Json(update): Json<SubscriptionsUpdate>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let userid = user.userid();
    for (subscription_type, active) in update.toggles() {
        if let Some(active) = active {
            subscriptions::set_active(state.repo.as_ref(), &userid, subscription_type, active)
                .await?;
        }
    }
    let subscriptions = subscriptions::get_all(state.repo.as_ref(), &userid).await?;
    Ok(Json(subscriptions))
}
