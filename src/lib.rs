use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod presenters;
pub mod repository;
pub mod schemas;
pub mod search;
pub mod services;

// Routing split by access level (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use search::{ElasticsearchClient, InMemorySearchIndex, SearchState, TransformSubscribers};

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and
/// `ToSchema` model. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::groups::list_groups, handlers::groups::create_group,
        handlers::groups::read_group, handlers::groups::update_group,
        handlers::profile::get_subscriptions, handlers::profile::update_subscriptions,
        handlers::admin::index, handlers::admin::nipsa_index, handlers::admin::nipsa_add,
        handlers::admin::nipsa_remove, handlers::admin::admins_index,
        handlers::admin::admins_add, handlers::admin::admins_remove,
        handlers::admin::staff_index, handlers::admin::staff_add,
        handlers::admin::staff_remove, handlers::admin::features_index,
        handlers::admin::features_update, handlers::admin::reindex,
        handlers::admin::sync_annotation,
    ),
    components(
        schemas(
            handlers::Health, error::ErrorBody,
            models::GroupType, models::Subscription, models::SubscriptionType,
            models::FeatureUpdate,
            presenters::GroupJson, presenters::GroupScopes,
            schemas::CreateGroupPayload, schemas::UpdateGroupPayload,
            handlers::profile::SubscriptionsUpdate,
            handlers::admin::AdminForm, handlers::admin::Flash, handlers::admin::AdminIndex,
            handlers::admin::NipsaView, handlers::admin::AdminsView,
            handlers::admin::StaffView, handlers::admin::FeatureView,
            handlers::admin::ReindexForm, handlers::admin::ReindexView,
            handlers::admin::SyncView, search::OpType,
        )
    ),
    tags(
        (name = "annotation-server", description = "Annotation server API and admin console")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single cloneable container of every service the handlers need,
/// shared across all requests.
#[derive(Clone)]
pub struct AppState {
    /// Relational storage (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// The document search engine annotations are indexed into.
    pub search: SearchState,
    /// Subscribers of `AnnotationTransformEvent`, run on every indexed annotation.
    pub transforms: Arc<TransformSubscribers>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SearchState {
    fn from_ref(app_state: &AppState) -> SearchState {
        app_state.search.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` resolves.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, scoped middleware and the observability
/// layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest("/admin", admin::admin_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`, carrying the `x-request-id` so every log line of a
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
