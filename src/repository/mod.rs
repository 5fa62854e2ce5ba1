use crate::models::{
    Annotation, Feature, FeatureUpdate, Group, GroupChanges, NewGroup, Subscription,
    SubscriptionType, User,
};
use async_trait::async_trait;
use std::sync::Arc;

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence contract used by handlers, services and the search
/// indexer. Handlers never see SQL; they talk to an `Arc<dyn Repository>`,
/// which is either the Postgres implementation or the in-memory one used by
/// the test suite.
///
/// Every method returns `sqlx::Error` on failure so callers can propagate
/// with `?` and let `ApiError` turn it into a 500.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>, sqlx::Error>;
    async fn get_user_by_username(
        &self,
        username: &str,
        authority: &str,
    ) -> Result<Option<User>, sqlx::Error>;
    async fn admins(&self) -> Result<Vec<User>, sqlx::Error>;
    async fn staff_members(&self) -> Result<Vec<User>, sqlx::Error>;
    async fn nipsa_users(&self) -> Result<Vec<User>, sqlx::Error>;
    async fn set_admin(&self, user_id: i32, admin: bool) -> Result<(), sqlx::Error>;
    /// Clears the admin flag of `user_id` unless that would leave no admin.
    /// Check and update are atomic; returns whether the flag was cleared.
    async fn revoke_admin(&self, user_id: i32) -> Result<bool, sqlx::Error>;
    async fn set_staff(&self, user_id: i32, staff: bool) -> Result<(), sqlx::Error>;
    async fn set_nipsa(&self, user_id: i32, nipsa: bool) -> Result<(), sqlx::Error>;

    // --- Feature flags ---
    async fn list_features(&self) -> Result<Vec<Feature>, sqlx::Error>;
    /// Inserts default rows for the given names, skipping existing ones.
    async fn insert_missing_features(&self, names: &[&str]) -> Result<u64, sqlx::Error>;
    async fn delete_features_not_in(&self, names: &[&str]) -> Result<u64, sqlx::Error>;
    async fn update_feature(&self, update: &FeatureUpdate) -> Result<Option<Feature>, sqlx::Error>;

    // --- Subscriptions ---
    /// Case-insensitive on `uri`.
    async fn subscriptions_for_uri(&self, uri: &str) -> Result<Vec<Subscription>, sqlx::Error>;
    async fn create_subscription(
        &self,
        uri: &str,
        subscription_type: SubscriptionType,
        active: bool,
    ) -> Result<Subscription, sqlx::Error>;
    async fn set_subscription_active(
        &self,
        id: i32,
        active: bool,
    ) -> Result<Option<Subscription>, sqlx::Error>;

    // --- Groups ---
    /// Looks a group up by `group:...@...` groupid or, otherwise, by pubid.
    async fn fetch_group(&self, pubid_or_groupid: &str) -> Result<Option<Group>, sqlx::Error>;
    async fn create_group(&self, group: NewGroup) -> Result<Group, sqlx::Error>;
    /// Sparse update; `None` fields keep their current value.
    async fn update_group(
        &self,
        id: i32,
        changes: &GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error>;
    /// Open and restricted groups of an authority.
    async fn world_readable_groups(&self, authority: &str) -> Result<Vec<Group>, sqlx::Error>;
    async fn groups_created_by(&self, userid: &str) -> Result<Vec<Group>, sqlx::Error>;

    // --- Annotations ---
    /// Ids of every annotation that is not soft-deleted, oldest update first.
    async fn annotation_ids(&self) -> Result<Vec<String>, sqlx::Error>;
    async fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>, sqlx::Error>;
    /// Non-deleted annotations among `ids`, with `user_nipsa` resolved.
    async fn annotations_by_ids(&self, ids: &[String]) -> Result<Vec<Annotation>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Name of the unique constraint on `groups.authid`.
pub const GROUPS_AUTHID_KEY: &str = "groups_authid_key";

pub(crate) fn is_groupid(pubid_or_groupid: &str) -> bool {
    pubid_or_groupid.starts_with("group:")
}
