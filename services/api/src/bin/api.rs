//! services/api/src/bin/api.rs

use api_lib::{
    adapters::DbAdapter,
    config::{Config, StoreBackend},
    error::ApiError,
    web::{self, AppState},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use scripture_reader_core::InMemoryStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Store ---
    let app_state = match &config.store {
        StoreBackend::Postgres { database_url, max_connections } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            AppState::new(db_adapter, config.clone())
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory sample store; highlights are lost on restart.");
            AppState::new(Arc::new(InMemoryStore::with_sample()), config.clone())
        }
    };
    let app_state = Arc::new(app_state);

    // --- 3. Evict Expired Cache Entries ---
    let fetcher = app_state.fetcher.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15 * 60));
        loop {
            interval.tick().await;
            let evicted = fetcher.prune();
            if evicted > 0 {
                info!(evicted, "Pruned expired cache entries");
            }
        }
    });

    // --- 4. Create the Web Router ---
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let app = web::router(app_state).layer(cors);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
