use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without credentials. Private groups are filtered out
/// by the handlers for anyone but their creator.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(handlers::health))
        // GET /api/groups?authority=...&document_uri=...&expand=...
        // The groups a client should offer for a document.
        .route("/api/groups", get(handlers::groups::list_groups))
        // GET /api/groups/{id}
        // A single group by pubid or groupid.
        .route("/api/groups/{id}", get(handlers::groups::read_group))
}
