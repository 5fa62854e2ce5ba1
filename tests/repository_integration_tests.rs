//! Postgres-backed repository tests. They need a disposable database:
//! `DATABASE_URL=... cargo test -- --ignored`.

use annotation_server::{
    models::{Feature, FeatureUpdate, GroupChanges, GroupType, NewGroup, SubscriptionType, User},
    repository::{GROUPS_AUTHID_KEY, PostgresRepository, Repository},
    services::{ServiceError, groups},
};
use serial_test::serial;
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

async fn create_test_user(pool: &PgPool, username: &str, authority: &str) -> User {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, authority)
        VALUES ($1, $2)
        RETURNING id, username, authority, display_name, admin, staff, nipsa
        "#,
    )
    .bind(username)
    .bind(authority)
    .fetch_one(pool)
    .await
    .expect("Failed to create test user")
}

async fn create_test_annotation(pool: &PgPool, userid: &str, deleted: bool) -> String {
    let id = Uuid::new_v4().simple().to_string();
    sqlx::query(
        "INSERT INTO annotations (id, userid, target_uri, deleted) VALUES ($1, $2, $3, $4)",
    )
    .bind(&id)
    .bind(userid)
    .bind("http://example.com")
    .bind(deleted)
    .execute(pool)
    .await
    .expect("Failed to create test annotation");
    id
}

// --- Users ---

#[test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_user_lookup_and_flags() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let authority = unique("auth") + ".example.com";
    let user = create_test_user(&ctx.pool, "Alice", &authority).await;

    let by_userid = repo
        .get_user_by_userid(&format!("acct:Alice@{}", authority))
        .await
        .unwrap();
    let by_lowercase = repo.get_user_by_username("alice", &authority).await.unwrap();
    assert_eq!(by_userid, Some(user.clone()));
    assert_eq!(by_lowercase, Some(user.clone()));

    repo.set_admin(user.id, true).await.unwrap();
    repo.set_nipsa(user.id, true).await.unwrap();

    let admins = repo.admins().await.unwrap();
    let nipsa = repo.nipsa_users().await.unwrap();
    assert!(admins.iter().any(|u| u.id == user.id));
    assert!(nipsa.iter().any(|u| u.id == user.id));
    assert!(!repo.staff_members().await.unwrap().iter().any(|u| u.id == user.id));
}

#[test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_concurrent_admin_revocations_keep_one_admin() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    sqlx::query("UPDATE users SET admin = false")
        .execute(&ctx.pool)
        .await
        .unwrap();
    let authority = unique("auth") + ".example.com";
    let first = create_test_user(&ctx.pool, "first", &authority).await;
    let second = create_test_user(&ctx.pool, "second", &authority).await;
    repo.set_admin(first.id, true).await.unwrap();
    repo.set_admin(second.id, true).await.unwrap();

    let (a, b) = tokio::join!(repo.revoke_admin(first.id), repo.revoke_admin(second.id));

    let revoked = [a.unwrap(), b.unwrap()].iter().filter(|r| **r).count();
    assert_eq!(revoked, 1);
    assert_eq!(repo.admins().await.unwrap().len(), 1);
}

// --- Features ---

#[test]
#[serial]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_feature_seed_update_and_cleanup() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    sqlx::query("DELETE FROM feature").execute(&ctx.pool).await.unwrap();
    sqlx::query("INSERT INTO feature (name) VALUES ('abouttoberemoved')")
        .execute(&ctx.pool)
        .await
        .unwrap();

    Feature::seed(&repo).await.unwrap();
    assert_eq!(Feature::seed(&repo).await.unwrap(), 0);
    assert_eq!(Feature::remove_old_flags(&repo).await.unwrap(), 1);

    let updated = repo
        .update_feature(&FeatureUpdate {
            name: "group_type".into(),
            admins: Some(true),
            ..FeatureUpdate::default()
        })
        .await
        .unwrap()
        .unwrap();
    assert!(updated.admins);
    assert!(!updated.everyone);

    let missing = repo
        .update_feature(&FeatureUpdate {
            name: "abouttoberemoved".into(),
            ..FeatureUpdate::default()
        })
        .await
        .unwrap();
    assert!(missing.is_none());
}

// --- Subscriptions ---

#[test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_subscription_lookup_is_case_insensitive() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let uri = format!("acct:{}@Example.com", unique("Bob"));

    let created = repo
        .create_subscription(&uri, SubscriptionType::Reply, true)
        .await
        .unwrap();
    let found = repo.subscriptions_for_uri(&uri.to_lowercase()).await.unwrap();
    assert_eq!(found, vec![created.clone()]);

    let toggled = repo
        .set_subscription_active(created.id, false)
        .await
        .unwrap()
        .unwrap();
    assert!(!toggled.active);
    assert_eq!(toggled.subscription_type, SubscriptionType::Reply);
}

// --- Groups ---

#[test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_group_create_fetch_and_sparse_update() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let authority = unique("auth") + ".example.com";
    let authid = format!("group:team@{}", authority);
    let creator = format!("acct:creator@{}", authority);

    let group = repo
        .create_group(NewGroup {
            pubid: unique("g"),
            authid: Some(authid.clone()),
            name: "Team".into(),
            description: Some("before".into()),
            authority: authority.clone(),
            group_type: GroupType::Restricted,
            creator_userid: Some(creator.clone()),
            scopes: vec!["http://example.com/".into()],
            pre_moderated: false,
        })
        .await
        .unwrap();

    assert_eq!(repo.fetch_group(&group.pubid).await.unwrap(), Some(group.clone()));
    assert_eq!(
        repo.fetch_group(&authid).await.unwrap().map(|g| g.id),
        Some(group.id)
    );

    let updated = repo
        .update_group(
            group.id,
            &GroupChanges {
                name: Some("Renamed".into()),
                ..GroupChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.description.as_deref(), Some("before"));
    assert_eq!(updated.group_type, GroupType::Restricted);
    assert_eq!(updated.scopes, vec!["http://example.com/".to_string()]);

    let world_readable = repo.world_readable_groups(&authority).await.unwrap();
    let created_by = repo.groups_created_by(&creator).await.unwrap();
    assert_eq!(world_readable.len(), 1);
    assert_eq!(created_by.len(), 1);
}

#[test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_duplicate_groupid_is_a_unique_violation() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let authority = unique("auth") + ".example.com";
    let authid = format!("group:dup@{}", authority);
    let new_group = |pubid: String| NewGroup {
        pubid,
        authid: Some(authid.clone()),
        name: "Dup".into(),
        authority: authority.clone(),
        group_type: GroupType::Open,
        ..NewGroup::default()
    };
    repo.create_group(new_group(unique("g"))).await.unwrap();

    let error = repo.create_group(new_group(unique("g"))).await.unwrap_err();
    match &error {
        sqlx::Error::Database(db) => {
            assert!(db.is_unique_violation());
            assert_eq!(db.constraint(), Some(GROUPS_AUTHID_KEY));
        }
        other => panic!("expected a database error, got {:?}", other),
    }

    let params = groups::GroupCreateParams {
        name: "Dup".into(),
        userid: format!("acct:someone@{}", authority),
        authority: authority.clone(),
        groupid: Some(authid.clone()),
        ..groups::GroupCreateParams::default()
    };
    let error = groups::create_open_group(&repo, params).await.unwrap_err();
    assert!(matches!(error, ServiceError::DuplicateGroupId(id) if id == authid));
}

// --- Annotations ---

#[test]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_annotations_skip_deleted_and_resolve_nipsa() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let authority = unique("auth") + ".example.com";
    let user = create_test_user(&ctx.pool, "troll", &authority).await;
    repo.set_nipsa(user.id, true).await.unwrap();

    let kept = create_test_annotation(&ctx.pool, &user.userid(), false).await;
    let deleted = create_test_annotation(&ctx.pool, &user.userid(), true).await;

    let ids = repo.annotation_ids_for_user(&user.userid()).await.unwrap();
    assert_eq!(ids, vec![kept.clone()]);
    assert!(repo.annotation_ids().await.unwrap().contains(&kept));

    let annotations = repo
        .annotations_by_ids(&[kept.clone(), deleted])
        .await
        .unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].id, kept);
    assert!(annotations[0].user_nipsa);
}
