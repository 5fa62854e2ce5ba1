use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// Pubid of the public group of the default authority.
pub const WORLD_GROUP_PUBID: &str = "__world__";

/// GroupType
///
/// The three visibility variants of a group.
/// - `Private`: members read, members write, joinable by invitation.
/// - `Restricted`: anyone reads, members write.
/// - `Open`: anyone reads, anyone in the authority writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum GroupType {
    #[default]
    Private,
    Restricted,
    Open,
}

#[derive(Debug, Error)]
#[error("'{0}' is not one of 'private', 'restricted', 'open'")]
pub struct InvalidGroupType(pub String);

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Private => "private",
            GroupType::Restricted => "restricted",
            GroupType::Open => "open",
        }
    }

    /// Whether people who are not members can read the group's annotations.
    pub fn world_readable(&self) -> bool {
        !matches!(self, GroupType::Private)
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for GroupType {
    type Error = InvalidGroupType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "private" => Ok(GroupType::Private),
            "restricted" => Ok(GroupType::Restricted),
            "open" => Ok(GroupType::Open),
            _ => Err(InvalidGroupType(value)),
        }
    }
}

/// Group
///
/// A row of the `groups` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Group {
    pub id: i32,
    /// Public id used in URLs and in the API's `id` field.
    pub pubid: String,
    /// Optional caller-assigned id of the form `group:{name}@{authority}`.
    pub authid: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub authority: String,

    // `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub group_type: GroupType,

    pub creator_userid: Option<String>,
    /// URI prefixes the group's annotations are restricted to.
    pub scopes: Vec<String>,
    pub pre_moderated: bool,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Whether `document_uri` falls under one of the group's scopes.
    /// Unscoped groups match every document.
    pub fn in_scope(&self, document_uri: &str) -> bool {
        self.scopes.is_empty()
            || self
                .scopes
                .iter()
                .any(|scope| document_uri.starts_with(scope.trim_end_matches('*')))
    }
}

/// NewGroup
///
/// Everything the repository needs to insert a group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewGroup {
    pub pubid: String,
    pub authid: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub authority: String,
    pub group_type: GroupType,
    pub creator_userid: Option<String>,
    pub scopes: Vec<String>,
    pub pre_moderated: bool,
}

/// GroupChanges
///
/// Sparse update of a group: `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authid: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub group_type: Option<GroupType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_moderated: Option<bool>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        *self == GroupChanges::default()
    }

    /// Applies the present fields to `group`.
    pub fn apply_to(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = Some(description.clone());
        }
        if let Some(authid) = &self.authid {
            group.authid = Some(authid.clone());
        }
        if let Some(group_type) = self.group_type {
            group.group_type = group_type;
        }
        if let Some(pre_moderated) = self.pre_moderated {
            group.pre_moderated = pre_moderated;
        }
    }
}
