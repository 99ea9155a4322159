//! Main Entrypoint for the Companion API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing the companion store: PostgreSQL (running migrations) or in-memory.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use companion_api::{
    config::{Config, StoreBackend},
    db::Db,
    router::create_router,
    state::AppState,
};
use companion_core::{service::CompanionService, store::InMemoryStore};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    match &config.store {
        StoreBackend::Postgres { database_url } => {
            let pool = PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?;
            let db = Arc::new(Db::new(pool));
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");

            Ok(AppState {
                service: CompanionService::new(db.clone()),
                history: db,
                config: Arc::new(config.clone()),
            })
        }
        StoreBackend::InMemory => {
            warn!("DATABASE_URL is not set; companions are kept in memory and lost on exit.");
            Ok(AppState::in_memory(
                config.clone(),
                Arc::new(InMemoryStore::new()),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize the Companion Store ---
    let app_state = Arc::new(build_state(&config).await?);

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        in_memory = matches!(config.store, StoreBackend::InMemory),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
