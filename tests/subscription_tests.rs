use annotation_server::{
    AppConfig, AppState, InMemoryRepository, InMemorySearchIndex, RepositoryState, SearchState,
    TransformSubscribers,
    auth::AuthUser,
    handlers::profile::{SubscriptionsUpdate, get_subscriptions, update_subscriptions},
    models::{
        Annotation, Feature, FeatureUpdate, Group, GroupChanges, NewGroup, Subscription,
        SubscriptionType, User,
    },
    repository::Repository,
    services::subscriptions,
};
use async_trait::async_trait;
use axum::{Json, extract::State};
use std::sync::Arc;
use tokio::test;

/// Deletes the subscription row right before it would be toggled, the way a
/// concurrent delete would.
struct VanishingSubscriptions(InMemoryRepository);

#[async_trait]
impl Repository for VanishingSubscriptions {
    async fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>, sqlx::Error> {
        self.0.get_user_by_userid(userid).await
    }
    async fn get_user_by_username(
        &self,
        username: &str,
        authority: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        self.0.get_user_by_username(username, authority).await
    }
    async fn admins(&self) -> Result<Vec<User>, sqlx::Error> {
        self.0.admins().await
    }
    async fn staff_members(&self) -> Result<Vec<User>, sqlx::Error> {
        self.0.staff_members().await
    }
    async fn nipsa_users(&self) -> Result<Vec<User>, sqlx::Error> {
        self.0.nipsa_users().await
    }
    async fn set_admin(&self, user_id: i32, admin: bool) -> Result<(), sqlx::Error> {
        self.0.set_admin(user_id, admin).await
    }
    async fn revoke_admin(&self, user_id: i32) -> Result<bool, sqlx::Error> {
        self.0.revoke_admin(user_id).await
    }
    async fn set_staff(&self, user_id: i32, staff: bool) -> Result<(), sqlx::Error> {
        self.0.set_staff(user_id, staff).await
    }
    async fn set_nipsa(&self, user_id: i32, nipsa: bool) -> Result<(), sqlx::Error> {
        self.0.set_nipsa(user_id, nipsa).await
    }
    async fn list_features(&self) -> Result<Vec<Feature>, sqlx::Error> {
        self.0.list_features().await
    }
    async fn insert_missing_features(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        self.0.insert_missing_features(names).await
    }
    async fn delete_features_not_in(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        self.0.delete_features_not_in(names).await
    }
    async fn update_feature(&self, update: &FeatureUpdate) -> Result<Option<Feature>, sqlx::Error> {
        self.0.update_feature(update).await
    }
    async fn subscriptions_for_uri(&self, uri: &str) -> Result<Vec<Subscription>, sqlx::Error> {
        self.0.subscriptions_for_uri(uri).await
    }
    async fn create_subscription(
        &self,
        uri: &str,
        subscription_type: SubscriptionType,
        active: bool,
    ) -> Result<Subscription, sqlx::Error> {
        self.0.create_subscription(uri, subscription_type, active).await
    }
    async fn set_subscription_active(
        &self,
        id: i32,
        active: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        self.0.remove_subscription(id);
        self.0.set_subscription_active(id, active).await
    }
    async fn fetch_group(&self, pubid_or_groupid: &str) -> Result<Option<Group>, sqlx::Error> {
        self.0.fetch_group(pubid_or_groupid).await
    }
    async fn create_group(&self, group: NewGroup) -> Result<Group, sqlx::Error> {
        self.0.create_group(group).await
    }
    async fn update_group(
        &self,
        id: i32,
        changes: &GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error> {
        self.0.update_group(id, changes).await
    }
    async fn world_readable_groups(&self, authority: &str) -> Result<Vec<Group>, sqlx::Error> {
        self.0.world_readable_groups(authority).await
    }
    async fn groups_created_by(&self, userid: &str) -> Result<Vec<Group>, sqlx::Error> {
        self.0.groups_created_by(userid).await
    }
    async fn annotation_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        self.0.annotation_ids().await
    }
    async fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>, sqlx::Error> {
        self.0.annotation_ids_for_user(userid).await
    }
    async fn annotations_by_ids(&self, ids: &[String]) -> Result<Vec<Annotation>, sqlx::Error> {
        self.0.annotations_by_ids(ids).await
    }
}

const USERID: &str = "acct:bob@example.com";

fn state(repo: &Arc<InMemoryRepository>) -> State<AppState> {
    State(AppState {
        repo: repo.clone() as RepositoryState,
        search: Arc::new(InMemorySearchIndex::default()) as SearchState,
        transforms: Arc::new(TransformSubscribers::default()),
        config: AppConfig::default(),
    })
}

fn bob(repo: &InMemoryRepository) -> AuthUser {
    let user = repo.add_user(User {
        username: "bob".into(),
        authority: "example.com".into(),
        ..User::default()
    });
    AuthUser { user }
}

// --- Service ---

#[test]
async fn test_get_all_creates_missing_subscriptions_as_active() {
    let repo = InMemoryRepository::new();

    let subscriptions = subscriptions::get_all(&repo, USERID).await.unwrap();

    let types: Vec<SubscriptionType> = subscriptions.iter().map(|s| s.subscription_type).collect();
    assert_eq!(types, SubscriptionType::ALL.to_vec());
    assert!(subscriptions.iter().all(|s| s.active && s.uri == USERID));
    assert_eq!(repo.subscriptions().len(), 3);
}

#[test]
async fn test_get_all_keeps_existing_rows() {
    let repo = InMemoryRepository::new();
    let existing = repo
        .create_subscription(USERID, SubscriptionType::Mention, false)
        .await
        .unwrap();

    let subscriptions = subscriptions::get_all(&repo, USERID).await.unwrap();
    let again = subscriptions::get_all(&repo, USERID).await.unwrap();

    assert_eq!(subscriptions[1], existing);
    assert_eq!(subscriptions, again);
    assert_eq!(repo.subscriptions().len(), 3);
}

#[test]
async fn test_uri_lookup_ignores_case() {
    let repo = InMemoryRepository::new();
    subscriptions::get_all(&repo, USERID).await.unwrap();

    let subscriptions = subscriptions::get_all(&repo, "acct:Bob@Example.com")
        .await
        .unwrap();

    assert_eq!(subscriptions.len(), 3);
    assert_eq!(repo.subscriptions().len(), 3);
}

#[test]
async fn test_set_active_toggles_one_type() {
    let repo = InMemoryRepository::new();

    let reply = subscriptions::set_active(&repo, USERID, SubscriptionType::Reply, false)
        .await
        .unwrap();

    assert!(!reply.active);
    let all = subscriptions::get_all(&repo, USERID).await.unwrap();
    assert!(!all[0].active);
    assert!(all[1].active);
    assert!(all[2].active);
}

#[test]
async fn test_set_active_recreates_a_row_deleted_underneath_it() {
    let repo = VanishingSubscriptions(InMemoryRepository::new());
    let before = subscriptions::get_all(&repo, USERID).await.unwrap();

    let reply = subscriptions::set_active(&repo, USERID, SubscriptionType::Reply, false)
        .await
        .unwrap();

    assert!(!reply.active);
    assert_ne!(reply.id, before[0].id);
    let stored = repo.0.subscriptions();
    assert_eq!(stored.len(), 3);
    assert!(stored.contains(&reply));
}

// --- Handlers ---

#[test]
async fn test_get_subscriptions_for_the_requester() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = bob(&repo);

    let subscriptions = get_subscriptions(user, state(&repo)).await.unwrap().0;

    assert_eq!(subscriptions.len(), 3);
    assert!(subscriptions.iter().all(|s| s.uri == USERID));
}

#[test]
async fn test_update_subscriptions_only_touches_given_types() {
    let repo = Arc::new(InMemoryRepository::new());
    let user = bob(&repo);
    subscriptions::set_active(repo.as_ref(), USERID, SubscriptionType::Mention, false)
        .await
        .unwrap();

    let subscriptions = update_subscriptions(
        user,
        state(&repo),
        Json(SubscriptionsUpdate {
            reply: Some(false),
            ..SubscriptionsUpdate::default()
        }),
    )
    .await
    .unwrap()
    .0;

    let active: Vec<(SubscriptionType, bool)> = subscriptions
        .iter()
        .map(|s| (s.subscription_type, s.active))
        .collect();
    assert_eq!(
        active,
        vec![
            (SubscriptionType::Reply, false),
            (SubscriptionType::Mention, false),
            (SubscriptionType::Moderation, true),
        ]
    );
}
