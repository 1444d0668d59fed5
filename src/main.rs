mod bot;
mod config;
mod error;
mod platform;
mod poller;
mod session;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::DialogMiner;
use crate::config::{Config, DatabaseConfig};
use crate::platform::telegram::TelegramClient;
use crate::platform::Messenger;
use crate::poller::Poller;
use crate::storage::postgres::PostgresStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::DialogStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dialog_miner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dialog-miner.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  API: {}", config.api_url);
    info!("  Poll interval: {:?}", config.poll_interval);
    info!("  Database backend: {}", config.backend());

    let store: Arc<dyn DialogStore> = match &config.database {
        DatabaseConfig::Postgres(credentials) => Arc::new(PostgresStore::new(credentials)),
        DatabaseConfig::Sqlite(path) => Arc::new(
            SqliteStore::open(path)
                .with_context(|| format!("Failed to open SQLite database {}", path.display()))?,
        ),
    };

    let messenger: Arc<dyn Messenger> = Arc::new(TelegramClient::new(config.bot_url()));
    let miner = DialogMiner::new(messenger.clone(), store, config.extra.clone());
    let mut poller = Poller::new(messenger, miner, config.poll_interval);

    info!("Bot is starting...");
    poller.run().await;

    Ok(())
}
