//! Request handlers, split by surface: the admin console, the groups API and
//! the user's profile.

pub mod admin;
pub mod groups;
pub mod profile;

use axum::{Json, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct Health {
    pub status: &'static str,
}

/// health
///
/// [Public Route] Liveness check for load balancers.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = Health))
)]
pub async fn health() -> (StatusCode, Json<Health>) {
    (StatusCode::OK, Json(Health { status: "ok" }))
}
