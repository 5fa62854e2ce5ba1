use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use serde_json::Value;

use crate::{
    AppState,
    auth::{AuthUser, Permission, permits},
    error::ApiError,
    models::{Group, GroupType},
    presenters::{EXPAND_SCOPES, GroupJSONPresenter, GroupJson, GroupsJSONPresenter},
    schemas::{CreateGroupAPISchema, CreateGroupPayload, UpdateGroupAPISchema, UpdateGroupPayload},
    services::{
        ServiceError,
        groups::{self, GroupCreateParams},
    },
};

/// Query parameters as received, keeping repeated keys such as `expand`.
type QueryPairs = Vec<(String, String)>;

fn param<'a>(params: &'a QueryPairs, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn expand(params: &QueryPairs) -> Vec<String> {
    params
        .iter()
        .filter(|(k, _)| k == "expand")
        .map(|(_, v)| v.clone())
        .collect()
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::Payload)
}

fn conflict(groupid: &str) -> ApiError {
    ServiceError::DuplicateGroupId(groupid.to_string()).into()
}

/// Private groups are only visible to their creator.
fn can_read(group: &Group, user: Option<&AuthUser>) -> bool {
    group.group_type.world_readable()
        || user.is_some_and(|u| group.creator_userid.as_deref() == Some(u.userid().as_str()))
}

async fn fetch_or_404(state: &AppState, id: &str) -> Result<Group, ApiError> {
    groups::fetch(state.repo.as_ref(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("group {} not found", id)))
}

/// list_groups
///
/// [Public Route] The groups a client should offer for a document: scoped
/// groups matching `document_uri`, the public group, then the requester's own.
#[utoipa::path(
    get,
    path = "/api/groups",
    params(
        ("authority" = Option<String>, Query, description = "Authority to list groups of"),
        ("document_uri" = Option<String>, Query, description = "Only scoped groups matching this URI"),
        ("expand" = Option<Vec<String>>, Query, description = "Repeatable; `scopes` is supported")
    ),
    responses((status = 200, description = "Groups", body = [GroupJson]))
)]
pub async fn list_groups(
    user: Option<AuthUser>,
    State(state): State<AppState>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<Vec<GroupJson>>, ApiError> {
    let groups = groups::request_groups(
        state.repo.as_ref(),
        &state.config.auth_domain,
        user.as_ref().map(|u| &u.user),
        param(&params, "authority"),
        param(&params, "document_uri"),
    )
    .await?;
    Ok(Json(GroupsJSONPresenter::new(&groups).as_json(&expand(&params))))
}

/// create_group
///
/// [Authenticated Route] Creates a private, restricted or open group owned by
/// the requester. An explicit `groupid` that already exists is a 409.
#[utoipa::path(
    post,
    path = "/api/groups",
    request_body = CreateGroupPayload,
    responses(
        (status = 200, description = "Created group", body = GroupJson),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "groupid already exists")
    )
)]
pub async fn create_group(
    user: AuthUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GroupJson>, ApiError> {
    if !permits(&user.principals(), Permission::CreateGroup) {
        return Err(ApiError::Forbidden);
    }

    let body = parse_body(&body)?;
    let payload = CreateGroupAPISchema::new(&state.config.auth_domain, &user.user.authority)
        .validate(&body)?;

    if let Some(groupid) = &payload.groupid {
        if groups::fetch(state.repo.as_ref(), groupid).await?.is_some() {
            return Err(conflict(groupid));
        }
    }

    let params = GroupCreateParams {
        name: payload.name,
        userid: user.userid(),
        authority: user.user.authority.clone(),
        description: payload.description,
        groupid: payload.groupid,
        scopes: payload.scopes,
        pre_moderated: payload.pre_moderated,
    };
    let repo = state.repo.as_ref();
    let group = match payload.group_type {
        GroupType::Private => groups::create_private_group(repo, params).await?,
        GroupType::Restricted => groups::create_restricted_group(repo, params).await?,
        GroupType::Open => groups::create_open_group(repo, params).await?,
    };

    Ok(Json(
        GroupJSONPresenter::new(&group).as_json(&[EXPAND_SCOPES.to_string()]),
    ))
}

/// read_group
///
/// [Public Route] One group by pubid or groupid, honoring `expand`.
#[utoipa::path(
    get,
    path = "/api/groups/{id}",
    params(
        ("id" = String, Path, description = "Pubid or groupid"),
        ("expand" = Option<Vec<String>>, Query, description = "Repeatable; `scopes` is supported")
    ),
    responses(
        (status = 200, description = "Group", body = GroupJson),
        (status = 404, description = "Not found")
    )
)]
pub async fn read_group(
    user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<GroupJson>, ApiError> {
    let group = fetch_or_404(&state, &id).await?;
    if !can_read(&group, user.as_ref()) {
        return Err(ApiError::NotFound(format!("group {} not found", id)));
    }
    Ok(Json(GroupJSONPresenter::new(&group).as_json(&expand(&params))))
}

/// update_group
///
/// [Authenticated Route] Sparse update by the group's creator. Only the
/// fields present in the body are forwarded; an empty body still issues the
/// update. A `groupid` already used by another group is a 409.
#[utoipa::path(
    patch,
    path = "/api/groups/{id}",
    params(("id" = String, Path, description = "Pubid or groupid")),
    request_body = UpdateGroupPayload,
    responses(
        (status = 200, description = "Updated group", body = GroupJson),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not the creator"),
        (status = 404, description = "Not found"),
        (status = 409, description = "groupid already exists")
    )
)]
pub async fn update_group(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<GroupJson>, ApiError> {
    let group = fetch_or_404(&state, &id).await?;
    if !can_read(&group, Some(&user)) {
        return Err(ApiError::NotFound(format!("group {} not found", id)));
    }
    if group.creator_userid.as_deref() != Some(user.userid().as_str()) {
        return Err(ApiError::Forbidden);
    }

    let body = parse_body(&body)?;
    let payload = UpdateGroupAPISchema::new(&state.config.auth_domain, &user.user.authority)
        .validate(&body)?;

    if let Some(groupid) = &payload.groupid {
        let existing = groups::fetch(state.repo.as_ref(), groupid).await?;
        if existing.is_some_and(|other| other.id != group.id) {
            return Err(conflict(groupid));
        }
    }

    let updated = groups::update(state.repo.as_ref(), &group, payload.into_changes()).await?;
    Ok(Json(
        GroupJSONPresenter::new(&updated).as_json(&[EXPAND_SCOPES.to_string()]),
    ))
}
