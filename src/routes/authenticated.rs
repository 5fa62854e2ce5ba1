use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Every handler here receives a validated `AuthUser`; the router is wrapped
/// in the authentication middleware by `create_router`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /api/groups
        // Creates a group owned by the requester.
        .route("/api/groups", post(handlers::groups::create_group))
        // PATCH /api/groups/{id}
        // Sparse update, creator only.
        .route("/api/groups/{id}", patch(handlers::groups::update_group))
        // GET/PATCH /api/profile/subscriptions
        // Email notification preferences of the requester.
        .route(
            "/api/profile/subscriptions",
            get(handlers::profile::get_subscriptions)
                .patch(handlers::profile::update_subscriptions),
        )
}
