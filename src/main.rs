use annotation_server::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    models::Feature,
    repository::{PostgresRepository, RepositoryState},
    search::{ElasticsearchClient, SearchClient, SearchState, TransformSubscribers},
    services::groups,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database (migrations and seed data),
/// search index, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production settings)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "annotation_server=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Seed data: feature flag rows and the public group.
    Feature::seed(repo.as_ref())
        .await
        .expect("FATAL: Failed to seed feature flags.");
    Feature::remove_old_flags(repo.as_ref())
        .await
        .expect("FATAL: Failed to remove old feature flags.");
    groups::ensure_world_group(repo.as_ref(), &config.auth_domain)
        .await
        .expect("FATAL: Failed to create the __world__ group.");

    // 5. Search index. An unreachable cluster is not fatal: indexing calls
    // fail individually until it comes back.
    let search_client = ElasticsearchClient::new(
        &config.search_url,
        &config.search_index,
        config.search_timeout,
    )
    .expect("FATAL: Invalid search engine configuration.");
    if let Err(e) = search_client.ensure_index().await {
        tracing::warn!("could not create search index {}: {}", config.search_index, e);
    }
    let search = Arc::new(search_client) as SearchState;
    tracing::info!("Indexing annotations into {}", search.index_name());

    // 6. Unified state
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        search,
        transforms: Arc::new(TransformSubscribers::default()),
        config,
    };

    // 7. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server error.");
}
