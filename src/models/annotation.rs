use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use super::user::split_user;

/// Annotation
///
/// A persisted annotation row. Annotations are never hard-deleted by the API;
/// `deleted` marks a soft deletion and keeps the row out of search indexing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Annotation {
    pub id: String,
    pub userid: String,
    /// Pubid of the group the annotation was posted to.
    pub groupid: String,
    pub target_uri: String,
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub shared: bool,
    /// Ids of the thread ancestors, root first.
    pub references: Vec<String>,
    pub target_selectors: Json<serde_json::Value>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Loaded by joining on `users`; not a column of `annotations`.
    #[sqlx(default)]
    #[serde(default)]
    pub user_nipsa: bool,
}

impl Annotation {
    /// Authority part of the author's user id.
    pub fn authority(&self) -> Option<&str> {
        split_user(&self.userid).map(|(_, authority)| authority)
    }

    /// Id of the thread root, or `None` for a top-level annotation.
    pub fn thread_root_id(&self) -> Option<&str> {
        self.references.first().map(String::as_str)
    }
}

impl Default for Annotation {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            userid: "acct:someone@localhost".to_string(),
            groupid: "__world__".to_string(),
            target_uri: "http://example.com".to_string(),
            text: None,
            tags: vec![],
            shared: true,
            references: vec![],
            target_selectors: Json(serde_json::Value::Array(vec![])),
            deleted: false,
            created_at: now,
            updated_at: now,
            user_nipsa: false,
        }
    }
}
