use axum::{
    Form, Json,
    extract::{Path, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    AppState,
    error::ApiError,
    models::{Feature, FeatureUpdate, is_known_feature, split_user, userid_from_username},
    search::{BatchIndexer, OpType, index as search_index},
    services::{ServiceError, accounts, nipsa::NipsaService},
};

/// AdminForm
///
/// Body of the admin console's add/remove forms. Each endpoint reads exactly
/// one of the two keys and answers 404 when it is missing.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AdminForm {
    pub add: Option<String>,
    pub remove: Option<String>,
}

/// A one-shot message shown above the rendered view.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Flash {
    pub kind: String,
    pub message: String,
}

impl Flash {
    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminIndex {
    pub sections: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NipsaView {
    /// Usernames of the NIPSA'd users.
    pub usernames: Vec<String>,
    pub flash: Vec<Flash>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminsView {
    pub admin_users: Vec<String>,
    pub flash: Vec<Flash>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StaffView {
    pub staff: Vec<String>,
    pub flash: Vec<Flash>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FeatureView {
    pub name: String,
    pub description: String,
    pub everyone: bool,
    pub first_party: bool,
    pub admins: bool,
    pub staff: bool,
}

/// Body of `POST /admin/search/reindex`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReindexForm {
    /// `index` (default) overwrites documents, `create` keeps existing ones.
    pub op_type: Option<OpType>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReindexView {
    pub op_type: String,
    /// Ids of the annotations that failed to index, sorted.
    pub errored: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SyncView {
    pub id: String,
    /// Whether the document was marked deleted instead of reindexed.
    pub deleted: bool,
}

fn required(value: Option<String>, key: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::NotFound(format!("missing form parameter '{}'", key)))
}

/// Turns `NoSuchUser` into a flash message, propagating everything else.
fn flash_missing_user(result: Result<(), ServiceError>) -> Result<Vec<Flash>, ApiError> {
    match result {
        Ok(()) => Ok(vec![]),
        Err(error @ ServiceError::NoSuchUser(_)) => Ok(vec![Flash::error(error.to_string())]),
        Err(error) => Err(error.into()),
    }
}

fn nipsa_service(state: &AppState) -> NipsaService {
    NipsaService::new(
        state.repo.clone(),
        state.search.clone(),
        state.transforms.clone(),
    )
}

/// index
///
/// [Admin Route] Entry point of the admin console.
#[utoipa::path(
    get,
    path = "/admin",
    responses((status = 200, description = "Admin sections", body = AdminIndex))
)]
pub async fn index() -> Json<AdminIndex> {
    let sections = ["nipsa", "admins", "staff", "features", "search"];
    Json(AdminIndex {
        sections: sections.iter().map(|s| s.to_string()).collect(),
    })
}

// --- NIPSA ---

async fn render_nipsa(state: &AppState, flash: Vec<Flash>) -> Result<Json<NipsaView>, ApiError> {
    let userids = nipsa_service(state).index().await?;
    let usernames = userids
        .iter()
        .filter_map(|userid| split_user(userid).map(|(username, _)| username.to_string()))
        .collect();
    Ok(Json(NipsaView { usernames, flash }))
}

#[utoipa::path(
    get,
    path = "/admin/nipsa",
    responses((status = 200, description = "NIPSA'd users", body = NipsaView))
)]
pub async fn nipsa_index(State(state): State<AppState>) -> Result<Json<NipsaView>, ApiError> {
    render_nipsa(&state, vec![]).await
}

/// nipsa_add
///
/// [Admin Route] NIPSAs a user. The flag is keyed by the full user id
/// (`acct:seanh@hypothes.is`), never the bare username.
#[utoipa::path(
    post,
    path = "/admin/nipsa",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "NIPSA'd users", body = NipsaView),
        (status = 404, description = "Missing 'add' parameter")
    )
)]
pub async fn nipsa_add(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Json<NipsaView>, ApiError> {
    let username = required(form.add, "add")?;
    let userid = userid_from_username(&username, &state.config.auth_domain);

    let result = nipsa_service(&state)
        .add_nipsa(&userid)
        .await
        .map_err(|error| match error {
            ServiceError::NoSuchUser(_) => ServiceError::NoSuchUser(username.clone()),
            error => error,
        });
    let flash = flash_missing_user(result)?;
    render_nipsa(&state, flash).await
}

#[utoipa::path(
    post,
    path = "/admin/nipsa/remove",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to /admin/nipsa"),
        (status = 404, description = "Missing 'remove' parameter")
    )
)]
pub async fn nipsa_remove(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Redirect, ApiError> {
    let username = required(form.remove, "remove")?;
    let userid = userid_from_username(&username, &state.config.auth_domain);

    if let Err(error) = nipsa_service(&state).remove_nipsa(&userid).await {
        match error {
            ServiceError::NoSuchUser(_) => tracing::debug!("{}", error),
            error => return Err(error.into()),
        }
    }
    Ok(Redirect::to("/admin/nipsa"))
}

// --- ADMINS ---

async fn render_admins(state: &AppState, flash: Vec<Flash>) -> Result<Json<AdminsView>, ApiError> {
    let admins = state.repo.admins().await?;
    Ok(Json(AdminsView {
        admin_users: admins.into_iter().map(|u| u.username).collect(),
        flash,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/admins",
    responses((status = 200, description = "Admin users", body = AdminsView))
)]
pub async fn admins_index(State(state): State<AppState>) -> Result<Json<AdminsView>, ApiError> {
    render_admins(&state, vec![]).await
}

#[utoipa::path(
    post,
    path = "/admin/admins",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Admin users", body = AdminsView),
        (status = 404, description = "Missing 'add' parameter")
    )
)]
pub async fn admins_add(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Json<AdminsView>, ApiError> {
    let username = required(form.add, "add")?;
    let result =
        accounts::make_admin(state.repo.as_ref(), &username, &state.config.auth_domain).await;
    let flash = flash_missing_user(result)?;
    render_admins(&state, flash).await
}

/// admins_remove
///
/// [Admin Route] Demotes an admin. The last remaining admin can never be
/// removed: with a single admin this is a no-op redirect.
#[utoipa::path(
    post,
    path = "/admin/admins/delete",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to /admin/admins"),
        (status = 404, description = "Missing 'remove' parameter")
    )
)]
pub async fn admins_remove(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Redirect, ApiError> {
    let username = required(form.remove, "remove")?;
    let user = state
        .repo
        .get_user_by_username(&username, &state.config.auth_domain)
        .await?;
    if let Some(user) = user {
        if state.repo.revoke_admin(user.id).await? {
            tracing::info!("removed admin rights from {}", user.userid());
        } else {
            tracing::debug!("kept admin rights of {}", user.userid());
        }
    }
    Ok(Redirect::to("/admin/admins"))
}

// --- STAFF ---

async fn render_staff(state: &AppState, flash: Vec<Flash>) -> Result<Json<StaffView>, ApiError> {
    let staff = state.repo.staff_members().await?;
    Ok(Json(StaffView {
        staff: staff.into_iter().map(|u| u.username).collect(),
        flash,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/staff",
    responses((status = 200, description = "Staff members", body = StaffView))
)]
pub async fn staff_index(State(state): State<AppState>) -> Result<Json<StaffView>, ApiError> {
    render_staff(&state, vec![]).await
}

#[utoipa::path(
    post,
    path = "/admin/staff",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Staff members", body = StaffView),
        (status = 404, description = "Missing 'add' parameter")
    )
)]
pub async fn staff_add(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Json<StaffView>, ApiError> {
    let username = required(form.add, "add")?;
    let result =
        accounts::make_staff(state.repo.as_ref(), &username, &state.config.auth_domain).await;
    let flash = flash_missing_user(result)?;
    render_staff(&state, flash).await
}

#[utoipa::path(
    post,
    path = "/admin/staff/delete",
    request_body(content = AdminForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to /admin/staff"),
        (status = 404, description = "Missing 'remove' parameter")
    )
)]
pub async fn staff_remove(
    State(state): State<AppState>,
    Form(form): Form<AdminForm>,
) -> Result<Redirect, ApiError> {
    let username = required(form.remove, "remove")?;
    let user = state
        .repo
        .get_user_by_username(&username, &state.config.auth_domain)
        .await?;
    if let Some(user) = user {
        state.repo.set_staff(user.id, false).await?;
        tracing::info!("removed staff rights from {}", user.userid());
    }
    Ok(Redirect::to("/admin/staff"))
}

// --- FEATURES ---

async fn render_features(state: &AppState) -> Result<Json<Vec<FeatureView>>, ApiError> {
    let features = Feature::all(state.repo.as_ref()).await?;
    Ok(Json(
        features
            .into_iter()
            .map(|feature| FeatureView {
                description: feature.description().unwrap_or_default().to_string(),
                name: feature.name,
                everyone: feature.everyone,
                first_party: feature.first_party,
                admins: feature.admins,
                staff: feature.staff,
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/features",
    responses((status = 200, description = "Feature flags", body = [FeatureView]))
)]
pub async fn features_index(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeatureView>>, ApiError> {
    render_features(&state).await
}

/// features_update
///
/// [Admin Route] Applies a sparse toggle update to one registered feature.
#[utoipa::path(
    post,
    path = "/admin/features",
    request_body(content = FeatureUpdate, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Feature flags", body = [FeatureView]),
        (status = 404, description = "Unknown feature")
    )
)]
pub async fn features_update(
    State(state): State<AppState>,
    Form(update): Form<FeatureUpdate>,
) -> Result<Json<Vec<FeatureView>>, ApiError> {
    let not_found = || ApiError::NotFound(format!("no feature named '{}'", update.name));
    if !is_known_feature(&update.name) {
        return Err(not_found());
    }
    state
        .repo
        .update_feature(&update)
        .await?
        .ok_or_else(not_found)?;
    tracing::info!("updated feature flag {}", update.name);
    render_features(&state).await
}

// --- SEARCH ---

/// reindex
///
/// [Admin Route] Pushes every live annotation into the search index and
/// reports the ids that failed.
#[utoipa::path(
    post,
    path = "/admin/search/reindex",
    request_body(content = ReindexForm, content_type = "application/x-www-form-urlencoded"),
    responses((status = 200, description = "Reindex result", body = ReindexView))
)]
pub async fn reindex(
    State(state): State<AppState>,
    Form(form): Form<ReindexForm>,
) -> Result<Json<ReindexView>, ApiError> {
    let op_type = form.op_type.unwrap_or_default();
    tracing::info!("reindexing all annotations with op_type={}", op_type);

    let errored = BatchIndexer::new(
        state.repo.clone(),
        state.search.clone(),
        state.transforms.clone(),
    )
    .with_op_type(op_type)
    .index(None)
    .await?;

    let mut errored: Vec<String> = errored.into_iter().collect();
    errored.sort();
    Ok(Json(ReindexView {
        op_type: op_type.to_string(),
        errored,
    }))
}

/// sync_annotation
///
/// [Admin Route] Brings the document of one annotation in line with the
/// database: live annotations are reindexed, anything else is marked deleted.
#[utoipa::path(
    post,
    path = "/admin/search/annotations/{id}",
    params(("id" = String, Path, description = "Annotation id")),
    responses((status = 200, description = "Synced document", body = SyncView))
)]
pub async fn sync_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncView>, ApiError> {
    let annotation = state
        .repo
        .annotations_by_ids(std::slice::from_ref(&id))
        .await?
        .into_iter()
        .next();

    let deleted = match annotation {
        Some(annotation) => {
            search_index::index_annotation(&state.search, &state.transforms, &annotation).await?;
            false
        }
        None => {
            search_index::delete(&state.search, &id).await?;
            true
        }
    };
    Ok(Json(SyncView { id, deleted }))
}
