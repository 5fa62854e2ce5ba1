use async_trait::async_trait;
use sqlx::PgPool;

use super::{Repository, is_groupid};
use crate::models::{
    Annotation, Feature, FeatureUpdate, Group, GroupChanges, NewGroup, Subscription,
    SubscriptionType, User,
};

const USER_COLUMNS: &str = "id, username, authority, display_name, admin, staff, nipsa";

const GROUP_COLUMNS: &str = "id, pubid, authid, name, description, authority, type, \
     creator_userid, scopes, pre_moderated, created_at, updated_at";

const ANNOTATION_SELECT: &str = r#"
    SELECT a.id, a.userid, a.groupid, a.target_uri, a.text, a.tags, a.shared,
           a."references", a.target_selectors, a.deleted, a.created_at, a.updated_at,
           COALESCE(u.nipsa, false) AS user_nipsa
    FROM annotations a
    LEFT JOIN users u ON a.userid = 'acct:' || u.username || '@' || u.authority
"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn users_where(&self, condition: &str) -> Result<Vec<User>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY username",
            USER_COLUMNS, condition
        );
        sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await
    }

    async fn set_user_flag(&self, column: &str, user_id: i32, value: bool) -> Result<(), sqlx::Error> {
        let sql = format!("UPDATE users SET {} = $1 WHERE id = $2", column);
        sqlx::query(&sql)
            .bind(value)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>, sqlx::Error> {
        let Some((username, authority)) = crate::models::split_user(userid) else {
            return Ok(None);
        };
        self.get_user_by_username(username, authority).await
    }

    /// get_user_by_username
    ///
    /// Usernames are compared case-insensitively, the way they are entered in
    /// the admin console.
    async fn get_user_by_username(
        &self,
        username: &str,
        authority: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM users WHERE lower(username) = lower($1) AND authority = $2",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .bind(authority)
            .fetch_optional(&self.pool)
            .await
    }

    async fn admins(&self) -> Result<Vec<User>, sqlx::Error> {
        self.users_where("admin = true").await
    }

    async fn staff_members(&self) -> Result<Vec<User>, sqlx::Error> {
        self.users_where("staff = true").await
    }

    async fn nipsa_users(&self) -> Result<Vec<User>, sqlx::Error> {
        self.users_where("nipsa = true").await
    }

    async fn set_admin(&self, user_id: i32, admin: bool) -> Result<(), sqlx::Error> {
        self.set_user_flag("admin", user_id, admin).await
    }

    /// revoke_admin
    ///
    /// Locks every admin row before counting, so concurrent demotions
    /// serialize and the last admin always survives.
    async fn revoke_admin(&self, user_id: i32) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let admins: Vec<i32> =
            sqlx::query_scalar("SELECT id FROM users WHERE admin ORDER BY id FOR UPDATE")
                .fetch_all(&mut *tx)
                .await?;
        if admins.len() <= 1 || !admins.contains(&user_id) {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("UPDATE users SET admin = false WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn set_staff(&self, user_id: i32, staff: bool) -> Result<(), sqlx::Error> {
        self.set_user_flag("staff", user_id, staff).await
    }

    async fn set_nipsa(&self, user_id: i32, nipsa: bool) -> Result<(), sqlx::Error> {
        self.set_user_flag("nipsa", user_id, nipsa).await
    }

    // --- FEATURE FLAGS ---

    async fn list_features(&self) -> Result<Vec<Feature>, sqlx::Error> {
        sqlx::query_as::<_, Feature>(
            "SELECT id, name, everyone, first_party, admins, staff FROM feature ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// insert_missing_features
    ///
    /// `ON CONFLICT DO NOTHING` on the unique `name` makes this idempotent.
    async fn insert_missing_features(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO feature (name) SELECT unnest($1::text[]) ON CONFLICT (name) DO NOTHING",
        )
        .bind(owned(names))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_features_not_in(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM feature WHERE NOT (name = ANY($1))")
            .bind(owned(names))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_feature(&self, update: &FeatureUpdate) -> Result<Option<Feature>, sqlx::Error> {
        sqlx::query_as::<_, Feature>(
            r#"
            UPDATE feature
            SET everyone = COALESCE($2, everyone),
                first_party = COALESCE($3, first_party),
                admins = COALESCE($4, admins),
                staff = COALESCE($5, staff)
            WHERE name = $1
            RETURNING id, name, everyone, first_party, admins, staff
            "#,
        )
        .bind(&update.name)
        .bind(update.everyone)
        .bind(update.first_party)
        .bind(update.admins)
        .bind(update.staff)
        .fetch_optional(&self.pool)
        .await
    }

    // --- SUBSCRIPTIONS ---

    /// subscriptions_for_uri
    ///
    /// Matches on `lower(uri)`, which is what `subs_uri_lower_idx_subscriptions` indexes.
    async fn subscriptions_for_uri(&self, uri: &str) -> Result<Vec<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            "SELECT id, uri, type, active FROM subscriptions WHERE lower(uri) = lower($1) ORDER BY id",
        )
        .bind(uri)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_subscription(
        &self,
        uri: &str,
        subscription_type: SubscriptionType,
        active: bool,
    ) -> Result<Subscription, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            "INSERT INTO subscriptions (uri, type, active) VALUES ($1, $2, $3) RETURNING id, uri, type, active",
        )
        .bind(uri)
        .bind(subscription_type.as_str())
        .bind(active)
        .fetch_one(&self.pool)
        .await
    }

    async fn set_subscription_active(
        &self,
        id: i32,
        active: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET active = $1 WHERE id = $2 RETURNING id, uri, type, active",
        )
        .bind(active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    // --- GROUPS ---

    async fn fetch_group(&self, pubid_or_groupid: &str) -> Result<Option<Group>, sqlx::Error> {
        let column = if is_groupid(pubid_or_groupid) {
            "authid"
        } else {
            "pubid"
        };
        let sql = format!("SELECT {} FROM groups WHERE {} = $1", GROUP_COLUMNS, column);
        sqlx::query_as::<_, Group>(&sql)
            .bind(pubid_or_groupid)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group, sqlx::Error> {
        let sql = format!(
            r#"INSERT INTO groups
                 (pubid, authid, name, description, authority, type, creator_userid, scopes, pre_moderated)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING {}"#,
            GROUP_COLUMNS
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(group.pubid)
            .bind(group.authid)
            .bind(group.name)
            .bind(group.description)
            .bind(group.authority)
            .bind(group.group_type.as_str())
            .bind(group.creator_userid)
            .bind(group.scopes)
            .bind(group.pre_moderated)
            .fetch_one(&self.pool)
            .await
    }

    /// update_group
    ///
    /// Uses `COALESCE` so that only the fields present in `changes` are written.
    async fn update_group(
        &self,
        id: i32,
        changes: &GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error> {
        let sql = format!(
            r#"UPDATE groups
               SET name = COALESCE($2, name),
                   description = COALESCE($3, description),
                   authid = COALESCE($4, authid),
                   type = COALESCE($5, type),
                   pre_moderated = COALESCE($6, pre_moderated),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            GROUP_COLUMNS
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.authid.as_deref())
            .bind(changes.group_type.map(|t| t.as_str()))
            .bind(changes.pre_moderated)
            .fetch_optional(&self.pool)
            .await
    }

    async fn world_readable_groups(&self, authority: &str) -> Result<Vec<Group>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM groups WHERE authority = $1 AND type IN ('open', 'restricted') ORDER BY name",
            GROUP_COLUMNS
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(authority)
            .fetch_all(&self.pool)
            .await
    }

    async fn groups_created_by(&self, userid: &str) -> Result<Vec<Group>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM groups WHERE creator_userid = $1 ORDER BY name",
            GROUP_COLUMNS
        );
        sqlx::query_as::<_, Group>(&sql)
            .bind(userid)
            .fetch_all(&self.pool)
            .await
    }

    // --- ANNOTATIONS ---

    async fn annotation_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM annotations WHERE deleted = false ORDER BY updated_at",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM annotations WHERE deleted = false AND userid = $1 ORDER BY updated_at",
        )
        .bind(userid)
        .fetch_all(&self.pool)
        .await
    }

    async fn annotations_by_ids(&self, ids: &[String]) -> Result<Vec<Annotation>, sqlx::Error> {
        let sql = format!(
            "{} WHERE a.deleted = false AND a.id = ANY($1) ORDER BY a.updated_at",
            ANNOTATION_SELECT
        );
        sqlx::query_as::<_, Annotation>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
    }
}
