pub mod api;
pub mod config;
pub mod db;
pub mod ids;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::server::{start_server, AppState};
use crate::config::{Config, StoreKind};
use crate::db::memory::MemoryUserStore;
use crate::db::repo::{SqliteUserStore, UserStore};
use crate::ids::UuidGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn UserStore> = match config.store {
        StoreKind::Sqlite => {
            info!(url = %config.database_url, "opening SQLite store");
            Arc::new(
                SqliteUserStore::connect(&config.database_url, config.max_connections)
                    .await
                    .context("failed to open SQLite store")?,
            )
        }
        StoreKind::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryUserStore::new())
        }
    };

    let state = Arc::new(AppState::new(store, Arc::new(UuidGenerator)));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind))?;

    start_server(listener, state).await.context("server failed")?;
    info!("Server stopped");

    Ok(())
}
