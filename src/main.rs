use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use code_relay::broadcast::Broadcaster;
use code_relay::config::{ConfigError, RelayConfig};
use code_relay::dedup::DedupCache;
use code_relay::directory::{DestinationDirectory, PgDirectoryStore};
use code_relay::ingest::Ingestor;
use code_relay::relay::Relay;
use code_relay::telegram::{BotApi, UpdatesFeed};

/// Capacity of the push channel between the update loop and the ingestor.
const PUSH_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
enum SetupError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to database: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

fn required_env(name: &'static str) -> Result<String, SetupError> {
    std::env::var(name).map_err(|_| SetupError::MissingEnv(name))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run().await {
        tracing::error!(%error, "startup failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SetupError> {
    let config_path =
        std::env::var("CODE_RELAY_CONFIG").unwrap_or_else(|_| "relay.json".to_string());
    let config = RelayConfig::load(&config_path)?;
    tracing::info!(
        path = %config_path,
        sources = config.sources.len(),
        "configuration loaded"
    );

    let bot_token = required_env("BOT_TOKEN")?;
    let database_url = required_env("DATABASE_URL")?;

    let (client, connection) = tokio_postgres::connect(&database_url, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            tracing::error!(%error, "database connection terminated");
        }
    });

    let directory = DestinationDirectory::new(
        PgDirectoryStore::new(client),
        config.directory_refresh_interval,
    );
    match directory.refresh().await {
        Ok(count) => tracing::info!(destinations = count, "initial directory snapshot loaded"),
        Err(error) => tracing::warn!(%error, "initial directory refresh failed, starting empty"),
    }

    let api = BotApi::new(&bot_token)?;
    let dedup = DedupCache::new(config.dedup_ttl, config.dedup_high_water);
    let broadcaster = Broadcaster::new(Arc::new(api.clone()));

    let (push_tx, push_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
    let feed = Arc::new(UpdatesFeed::new(
        api,
        config.sources.keys().copied(),
        push_tx,
    ));

    let relay = Arc::new(Relay::new(config, dedup, directory, broadcaster));
    let mut ingestor = Ingestor::new(Arc::clone(&feed), relay);
    ingestor.check_access().await;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let feed = Arc::clone(&feed);
        let shutdown = shutdown.clone();
        async move { feed.run(shutdown).await }
    });
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    ingestor.run(push_rx, shutdown).await;
    tracing::info!("relay stopped");
    Ok(())
}
