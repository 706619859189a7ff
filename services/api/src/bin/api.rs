//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{LogNotifier, OperatorGate, PgTrackingStore, WebhookNotifier},
    config::{Config, ConfigError, StorageBackend},
    error::ApiError,
    web::{build_router, AppState},
};
use engagement_core::ports::{ShareNotifier, TrackingStore};
use engagement_core::{Clock, Engine, InMemoryTrackingStore, RetryPolicy, RetryingStore, SystemClock};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
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

    // --- 2. Connect to Storage & Run Migrations ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let raw_store: Arc<dyn TrackingStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await?;
            let pg_store = PgTrackingStore::new(db_pool);
            info!("Running database migrations...");
            pg_store.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(pg_store)
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store; tracking data will not survive a restart.");
            Arc::new(InMemoryTrackingStore::with_clock(clock.clone()))
        }
    };
    let policy = RetryPolicy::new(config.storage_retry_attempts, config.storage_retry_base_delay);
    let store: Arc<dyn TrackingStore> = Arc::new(RetryingStore::new(raw_store, policy));

    // --- 3. Initialize Service Adapters ---
    let notifier: Arc<dyn ShareNotifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!(endpoint = %url, "Share links will be posted to the notification webhook");
            Arc::new(WebhookNotifier::new(url.clone()).map_err(|e| ApiError::Internal(e.to_string()))?)
        }
        None => Arc::new(LogNotifier),
    };
    if config.operator_credentials.is_some() {
        info!("Operator login enabled at /v1/auth/login");
    }
    let gate = Arc::new(OperatorGate::new(
        config.operator_tokens.clone(),
        config.operator_credentials.clone(),
        config.operator_session_ttl,
        clock.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        engine: Engine::new(store, clock.clone()),
        notifier,
        gate,
        clock,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let app = build_router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
