use std::sync::Arc;

use anyhow::Context;
use aufait_listener::api::{self, AppState};
use aufait_listener::config::Config;
use aufait_listener::db;
use aufait_listener::store::{InMemoryStore, JobStore, PgJobStore, PgRepositoryStore, RepositoryStore};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aufait_listener=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting Au Fait listener...");

    let (repositories, jobs): (Arc<dyn RepositoryStore>, Arc<dyn JobStore>) = if config.in_memory {
        tracing::warn!("Using in-memory stores; nothing survives a restart");
        let store = Arc::new(InMemoryStore::new());
        let repositories: Arc<dyn RepositoryStore> = store.clone();
        let jobs: Arc<dyn JobStore> = store;
        (repositories, jobs)
    } else {
        tracing::info!("Connecting to database...");

        let pool = db::create_pool(&config.database_url, config.db_max_connections)
            .await
            .context("Failed to create database pool")?;

        tracing::info!("Database connection pool created");

        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        let repositories: Arc<dyn RepositoryStore> = Arc::new(PgRepositoryStore::new(pool.clone()));
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));
        (repositories, jobs)
    };

    let state = AppState::new(repositories, jobs, config.retry_policy()?);
    let app = api::create_router(state, config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Listener stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
