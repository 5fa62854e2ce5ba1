use crate::{
    AppState,
    auth::{AuthUser, Permission, permits},
    error::ApiError,
    handlers::admin,
};
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};

/// require_admin
///
/// Route middleware for the admin console. Unauthenticated requests are
/// rejected by the `AuthUser` extractor (401); authenticated requests without
/// the admin principal get a 403.
async fn require_admin(user: AuthUser, request: Request, next: Next) -> Result<Response, ApiError> {
    if !permits(&user.principals(), Permission::Admin) {
        tracing::warn!("{} tried to access {}", user.userid(), request.uri());
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Admin Router Module
///
/// Mounted under `/admin`. Every route requires `Permission::Admin`.
pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(admin::index))
        // NIPSA list, keyed by full user id.
        .route("/nipsa", get(admin::nipsa_index).post(admin::nipsa_add))
        .route("/nipsa/remove", post(admin::nipsa_remove))
        // Admin users. The last admin cannot be removed.
        .route("/admins", get(admin::admins_index).post(admin::admins_add))
        .route("/admins/delete", post(admin::admins_remove))
        // Staff members.
        .route("/staff", get(admin::staff_index).post(admin::staff_add))
        .route("/staff/delete", post(admin::staff_remove))
        // Feature flags.
        .route("/features", get(admin::features_index).post(admin::features_update))
        // Search index maintenance.
        .route("/search/reindex", post(admin::reindex))
        .route("/search/annotations/{id}", post(admin::sync_annotation))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}
