use async_trait::async_trait;
use chrono::Utc;
use sqlx::error::{DatabaseError, ErrorKind};
use std::{
    borrow::Cow,
    error::Error as StdError,
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

use super::{GROUPS_AUTHID_KEY, Repository, is_groupid};
use crate::models::{
    Annotation, Feature, FeatureUpdate, Group, GroupChanges, GroupType, NewGroup, Subscription,
    SubscriptionType, User, split_user,
};

#[derive(Default)]
struct Store {
    users: Vec<User>,
    groups: Vec<Group>,
    annotations: Vec<Annotation>,
    features: Vec<Feature>,
    subscriptions: Vec<Subscription>,
    group_updates: Vec<(i32, GroupChanges)>,
    next_id: i32,
}

impl Store {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory. It mirrors the Postgres
/// semantics the rest of the crate relies on (case-insensitive subscription
/// URIs, soft-deleted annotations excluded, sparse group updates) so handler
/// and indexer logic can be exercised without a database.
///
/// The `add_*` helpers seed data directly; `group_updates` records every
/// `update_group` call for assertions.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `user`, assigning an id when it has none.
    pub fn add_user(&self, mut user: User) -> User {
        let mut store = self.store();
        if user.id == 0 {
            user.id = store.next_id();
        }
        store.users.push(user.clone());
        user
    }

    pub fn add_group(&self, group: NewGroup) -> Group {
        let mut store = self.store();
        insert_group(&mut store, group)
    }

    pub fn add_annotation(&self, annotation: Annotation) -> Annotation {
        self.store().annotations.push(annotation.clone());
        annotation
    }

    /// Stores a feature row with every toggle off, whether or not `name` is registered.
    pub fn add_feature(&self, name: &str) -> Feature {
        let mut store = self.store();
        let feature = Feature {
            id: store.next_id(),
            name: name.to_string(),
            ..Feature::default()
        };
        store.features.push(feature.clone());
        feature
    }

    pub fn user(&self, user_id: i32) -> Option<User> {
        self.store().users.iter().find(|u| u.id == user_id).cloned()
    }

    pub fn features(&self) -> Vec<Feature> {
        self.store().features.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.store().subscriptions.clone()
    }

    pub fn remove_subscription(&self, id: i32) {
        self.store().subscriptions.retain(|s| s.id != id);
    }

    /// Every `update_group` call so far, as `(group id, changes)`.
    pub fn group_updates(&self) -> Vec<(i32, GroupChanges)> {
        self.store().group_updates.clone()
    }

    fn users_matching(&self, predicate: impl Fn(&User) -> bool) -> Vec<User> {
        let mut users: Vec<User> = self.store().users.iter().filter(|u| predicate(u)).cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    fn update_user(&self, user_id: i32, update: impl FnOnce(&mut User)) {
        if let Some(user) = self.store().users.iter_mut().find(|u| u.id == user_id) {
            update(user);
        }
    }
}

/// What Postgres reports for a duplicate key, so callers see the same error
/// shape from either repository.
#[derive(Debug, Error)]
#[error("duplicate key value violates unique constraint \"{constraint}\"")]
struct UniqueViolation {
    constraint: &'static str,
}

impl DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("23505"))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

fn unique_violation(constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(UniqueViolation { constraint }))
}

/// Whether a group other than `id` already owns `authid`.
fn authid_taken(store: &Store, authid: Option<&str>, id: i32) -> bool {
    authid.is_some_and(|authid| {
        store
            .groups
            .iter()
            .any(|g| g.id != id && g.authid.as_deref() == Some(authid))
    })
}

fn insert_group(store: &mut Store, group: NewGroup) -> Group {
    let now = Utc::now();
    let group = Group {
        id: store.next_id(),
        pubid: group.pubid,
        authid: group.authid,
        name: group.name,
        description: group.description,
        authority: group.authority,
        group_type: group.group_type,
        creator_userid: group.creator_userid,
        scopes: group.scopes,
        pre_moderated: group.pre_moderated,
        created_at: now,
        updated_at: now,
    };
    store.groups.push(group.clone());
    group
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>, sqlx::Error> {
        let Some((username, authority)) = split_user(userid) else {
            return Ok(None);
        };
        self.get_user_by_username(username, authority).await
    }

    async fn get_user_by_username(
        &self,
        username: &str,
        authority: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .store()
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username) && u.authority == authority)
            .cloned())
    }

    async fn admins(&self) -> Result<Vec<User>, sqlx::Error> {
        Ok(self.users_matching(|u| u.admin))
    }

    async fn staff_members(&self) -> Result<Vec<User>, sqlx::Error> {
        Ok(self.users_matching(|u| u.staff))
    }

    async fn nipsa_users(&self) -> Result<Vec<User>, sqlx::Error> {
        Ok(self.users_matching(|u| u.nipsa))
    }

    async fn set_admin(&self, user_id: i32, admin: bool) -> Result<(), sqlx::Error> {
        self.update_user(user_id, |u| u.admin = admin);
        Ok(())
    }

    async fn revoke_admin(&self, user_id: i32) -> Result<bool, sqlx::Error> {
        let mut store = self.store();
        let admins = store.users.iter().filter(|u| u.admin).count();
        match store.users.iter_mut().find(|u| u.id == user_id && u.admin) {
            Some(user) if admins > 1 => {
                user.admin = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_staff(&self, user_id: i32, staff: bool) -> Result<(), sqlx::Error> {
        self.update_user(user_id, |u| u.staff = staff);
        Ok(())
    }

    async fn set_nipsa(&self, user_id: i32, nipsa: bool) -> Result<(), sqlx::Error> {
        self.update_user(user_id, |u| u.nipsa = nipsa);
        Ok(())
    }

    async fn list_features(&self) -> Result<Vec<Feature>, sqlx::Error> {
        Ok(self.features())
    }

    async fn insert_missing_features(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        let mut store = self.store();
        let mut created = 0;
        for name in names {
            if store.features.iter().any(|f| f.name == *name) {
                continue;
            }
            let feature = Feature {
                id: store.next_id(),
                name: name.to_string(),
                ..Feature::default()
            };
            store.features.push(feature);
            created += 1;
        }
        Ok(created)
    }

    async fn delete_features_not_in(&self, names: &[&str]) -> Result<u64, sqlx::Error> {
        let mut store = self.store();
        let before = store.features.len();
        store.features.retain(|f| names.contains(&f.name.as_str()));
        Ok((before - store.features.len()) as u64)
    }

    async fn update_feature(&self, update: &FeatureUpdate) -> Result<Option<Feature>, sqlx::Error> {
        let mut store = self.store();
        let Some(feature) = store.features.iter_mut().find(|f| f.name == update.name) else {
            return Ok(None);
        };
        feature.everyone = update.everyone.unwrap_or(feature.everyone);
        feature.first_party = update.first_party.unwrap_or(feature.first_party);
        feature.admins = update.admins.unwrap_or(feature.admins);
        feature.staff = update.staff.unwrap_or(feature.staff);
        Ok(Some(feature.clone()))
    }

    async fn subscriptions_for_uri(&self, uri: &str) -> Result<Vec<Subscription>, sqlx::Error> {
        let uri = uri.to_lowercase();
        Ok(self
            .store()
            .subscriptions
            .iter()
            .filter(|s| s.uri.to_lowercase() == uri)
            .cloned()
            .collect())
    }

    async fn create_subscription(
        &self,
        uri: &str,
        subscription_type: SubscriptionType,
        active: bool,
    ) -> Result<Subscription, sqlx::Error> {
        let mut store = self.store();
        let subscription = Subscription {
            id: store.next_id(),
            uri: uri.to_string(),
            subscription_type,
            active,
        };
        store.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn set_subscription_active(
        &self,
        id: i32,
        active: bool,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        let mut store = self.store();
        Ok(store
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| {
                s.active = active;
                s.clone()
            }))
    }

    async fn fetch_group(&self, pubid_or_groupid: &str) -> Result<Option<Group>, sqlx::Error> {
        let by_groupid = is_groupid(pubid_or_groupid);
        Ok(self
            .store()
            .groups
            .iter()
            .find(|g| {
                if by_groupid {
                    g.authid.as_deref() == Some(pubid_or_groupid)
                } else {
                    g.pubid == pubid_or_groupid
                }
            })
            .cloned())
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group, sqlx::Error> {
        let mut store = self.store();
        if authid_taken(&store, group.authid.as_deref(), 0) {
            return Err(unique_violation(GROUPS_AUTHID_KEY));
        }
        Ok(insert_group(&mut store, group))
    }

    async fn update_group(
        &self,
        id: i32,
        changes: &GroupChanges,
    ) -> Result<Option<Group>, sqlx::Error> {
        let mut store = self.store();
        if authid_taken(&store, changes.authid.as_deref(), id) {
            return Err(unique_violation(GROUPS_AUTHID_KEY));
        }
        store.group_updates.push((id, changes.clone()));
        Ok(store.groups.iter_mut().find(|g| g.id == id).map(|group| {
            changes.apply_to(group);
            group.updated_at = Utc::now();
            group.clone()
        }))
    }

    async fn world_readable_groups(&self, authority: &str) -> Result<Vec<Group>, sqlx::Error> {
        Ok(self
            .store()
            .groups
            .iter()
            .filter(|g| g.authority == authority && g.group_type != GroupType::Private)
            .cloned()
            .collect())
    }

    async fn groups_created_by(&self, userid: &str) -> Result<Vec<Group>, sqlx::Error> {
        Ok(self
            .store()
            .groups
            .iter()
            .filter(|g| g.creator_userid.as_deref() == Some(userid))
            .cloned()
            .collect())
    }

    async fn annotation_ids(&self) -> Result<Vec<String>, sqlx::Error> {
        Ok(self
            .store()
            .annotations
            .iter()
            .filter(|a| !a.deleted)
            .map(|a| a.id.clone())
            .collect())
    }

    async fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>, sqlx::Error> {
        Ok(self
            .store()
            .annotations
            .iter()
            .filter(|a| !a.deleted && a.userid == userid)
            .map(|a| a.id.clone())
            .collect())
    }

    async fn annotations_by_ids(&self, ids: &[String]) -> Result<Vec<Annotation>, sqlx::Error> {
        let store = self.store();
        Ok(store
            .annotations
            .iter()
            .filter(|a| !a.deleted && ids.contains(&a.id))
            .map(|a| {
                let mut annotation = a.clone();
                annotation.user_nipsa = store
                    .users
                    .iter()
                    .any(|u| u.nipsa && u.userid() == a.userid);
                annotation
            })
            .collect())
    }
}
