use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_hub::config::{Config, LogFormat, StoreBackend};
use event_hub::store::{MemoryStore, PgStore, SharedStore};
use event_hub::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "event_hub=debug,tower_http=debug".into());
    match config.log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
    tracing::info!(env = ?config.app.env, "Configuration loaded");

    let store: SharedStore = match config.store.backend {
        StoreBackend::Postgres => {
            let pg = PgStore::connect(&config.store.url, config.store.max_connections).await?;
            pg.run_migrations().await?;
            tracing::info!("Connected to PostgreSQL");
            Arc::new(pg)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, &config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
