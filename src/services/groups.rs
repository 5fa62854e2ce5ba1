use std::collections::HashSet;

use uuid::Uuid;

use super::ServiceError;
use crate::{
    models::{Group, GroupChanges, GroupType, NewGroup, User, WORLD_GROUP_PUBID},
    repository::{GROUPS_AUTHID_KEY, Repository},
};

const PUBID_LENGTH: usize = 8;

/// Everything the three group creation calls take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupCreateParams {
    pub name: String,
    /// Userid of the creator.
    pub userid: String,
    pub authority: String,
    pub description: Option<String>,
    /// Caller-assigned `group:{name}@{authority}` id.
    pub groupid: Option<String>,
    pub scopes: Vec<String>,
    pub pre_moderated: bool,
}

/// Maps a unique violation on `groups.authid` to `DuplicateGroupId`.
fn duplicate_groupid(groupid: Option<&str>) -> impl FnOnce(sqlx::Error) -> ServiceError + '_ {
    move |error| match (&error, groupid) {
        (sqlx::Error::Database(db), Some(groupid))
            if db.is_unique_violation() && db.constraint() == Some(GROUPS_AUTHID_KEY) =>
        {
            ServiceError::DuplicateGroupId(groupid.to_string())
        }
        _ => ServiceError::Database(error),
    }
}

pub async fn fetch(
    repo: &dyn Repository,
    pubid_or_groupid: &str,
) -> Result<Option<Group>, ServiceError> {
    Ok(repo.fetch_group(pubid_or_groupid).await?)
}

/// request_groups
///
/// The groups a client should offer, in order:
/// 1. open and restricted groups of `authority` scoped to `document_uri`,
/// 2. the public `__world__` group when `authority` is the default one,
/// 3. the groups `user` created.
///
/// `authority` falls back to the user's own, then to `default_authority`.
/// Each group appears once.
pub async fn request_groups(
    repo: &dyn Repository,
    default_authority: &str,
    user: Option<&User>,
    authority: Option<&str>,
    document_uri: Option<&str>,
) -> Result<Vec<Group>, ServiceError> {
    let authority = authority
        .or(user.map(|u| u.authority.as_str()))
        .unwrap_or(default_authority);

    let mut groups = Vec::new();

    if let Some(document_uri) = document_uri {
        groups.extend(
            repo.world_readable_groups(authority)
                .await?
                .into_iter()
                .filter(|g| !g.scopes.is_empty() && g.in_scope(document_uri)),
        );
    }

    if authority == default_authority {
        if let Some(world) = repo.fetch_group(WORLD_GROUP_PUBID).await? {
            groups.push(world);
        }
    }

    if let Some(user) = user {
        groups.extend(repo.groups_created_by(&user.userid()).await?);
    }

    let mut seen = HashSet::new();
    groups.retain(|g| seen.insert(g.id));
    Ok(groups)
}

pub async fn create_private_group(
    repo: &dyn Repository,
    params: GroupCreateParams,
) -> Result<Group, ServiceError> {
    create_group(
        repo,
        GroupType::Private,
        GroupCreateParams {
            scopes: vec![],
            ..params
        },
    )
    .await
}

pub async fn create_restricted_group(
    repo: &dyn Repository,
    params: GroupCreateParams,
) -> Result<Group, ServiceError> {
    create_group(repo, GroupType::Restricted, params).await
}

pub async fn create_open_group(
    repo: &dyn Repository,
    params: GroupCreateParams,
) -> Result<Group, ServiceError> {
    create_group(repo, GroupType::Open, params).await
}

async fn create_group(
    repo: &dyn Repository,
    group_type: GroupType,
    params: GroupCreateParams,
) -> Result<Group, ServiceError> {
    let groupid = params.groupid.clone();
    let group = repo
        .create_group(NewGroup {
            pubid: new_pubid(),
            authid: params.groupid,
            name: params.name,
            description: params.description,
            authority: params.authority,
            group_type,
            creator_userid: Some(params.userid),
            scopes: params.scopes,
            pre_moderated: params.pre_moderated,
        })
        .await
        .map_err(duplicate_groupid(groupid.as_deref()))?;
    tracing::info!("created {} group {} ({})", group_type, group.pubid, group.name);
    Ok(group)
}

/// Applies `changes` to `group`. Always issues the update, even when
/// `changes` is empty.
pub async fn update(
    repo: &dyn Repository,
    group: &Group,
    changes: GroupChanges,
) -> Result<Group, ServiceError> {
    if changes.is_empty() {
        tracing::debug!("empty update of group {}", group.pubid);
    }
    repo.update_group(group.id, &changes)
        .await
        .map_err(duplicate_groupid(changes.authid.as_deref()))?
        .ok_or_else(|| ServiceError::NoSuchGroup(group.pubid.clone()))
}

/// Creates the public `__world__` group of `authority` unless it exists.
pub async fn ensure_world_group(
    repo: &dyn Repository,
    authority: &str,
) -> Result<Group, ServiceError> {
    if let Some(group) = repo.fetch_group(WORLD_GROUP_PUBID).await? {
        return Ok(group);
    }
    let group = repo
        .create_group(NewGroup {
            pubid: WORLD_GROUP_PUBID.to_string(),
            name: "Public".to_string(),
            authority: authority.to_string(),
            group_type: GroupType::Open,
            ..NewGroup::default()
        })
        .await?;
    tracing::info!("created the {} group for {}", WORLD_GROUP_PUBID, authority);
    Ok(group)
}

fn new_pubid() -> String {
    let mut pubid = Uuid::new_v4().simple().to_string();
    pubid.truncate(PUBID_LENGTH);
    pubid
}
