use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

/// User
///
/// An account on the annotation service, stored in the `users` table.
/// The `admin`, `staff` and `nipsa` flags are the only fields mutated by the
/// admin console.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub authority: String,
    pub display_name: Option<String>,
    pub admin: bool,
    pub staff: bool,
    /// Shadow-ban marker. Annotations of NIPSA'd users are flagged in the search index.
    pub nipsa: bool,
}

impl User {
    /// The fully qualified user id, e.g. `acct:seanh@hypothes.is`.
    pub fn userid(&self) -> String {
        userid_from_username(&self.username, &self.authority)
    }
}

/// Builds a fully qualified user id from a bare username and an authority.
pub fn userid_from_username(username: &str, authority: &str) -> String {
    format!("acct:{}@{}", username, authority)
}

/// Splits `acct:username@authority` into `(username, authority)`.
///
/// Returns `None` for anything that is not a well formed user id.
pub fn split_user(userid: &str) -> Option<(&str, &str)> {
    let rest = userid.strip_prefix("acct:")?;
    let (username, authority) = rest.split_once('@')?;
    if username.is_empty() || authority.is_empty() {
        return None;
    }
    Some((username, authority))
}
