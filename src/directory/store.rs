//! The relational store behind the destination directory.
//!
//! `DirectoryStore` is the seam between the directory and the database; tests
//! provide mock implementations, production uses `PgDirectoryStore` over
//! tokio-postgres.

use std::future::Future;

use thiserror::Error;
use tokio_postgres::Client;

use crate::types::ChannelId;

use super::snapshot::{Destination, LinkOverride};

/// Errors from the relational store.
///
/// Store failures are never fatal to the running process: a failed refresh is
/// logged and the previous directory snapshot stays in effect.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Used by tests and non-database store implementations.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of destination eligibility and link overrides.
pub trait DirectoryStore {
    /// Distinct destination channels joined to their owning user, filtered to
    /// channels not paused and users not banned, active, and bot-enabled.
    fn eligible_destinations(
        &self,
    ) -> impl Future<Output = Result<Vec<Destination>, StoreError>> + Send;

    /// All link overrides.
    fn link_overrides(&self) -> impl Future<Output = Result<Vec<LinkOverride>, StoreError>> + Send;
}

const ELIGIBLE_DESTINATIONS_SQL: &str = "\
    SELECT DISTINCT uc.channel_id, uc.user_id \
    FROM user_channels uc \
    INNER JOIN users u ON uc.user_id = u.id \
    WHERE uc.paused = false \
      AND u.is_banned = false \
      AND u.is_active = true \
      AND u.bot_enabled = true";

const LINK_OVERRIDES_SQL: &str =
    "SELECT user_id, channel_id, link_code, link_url FROM admin_links";

/// `DirectoryStore` over a PostgreSQL connection.
pub struct PgDirectoryStore {
    client: Client,
}

impl PgDirectoryStore {
    pub fn new(client: Client) -> Self {
        PgDirectoryStore { client }
    }
}

impl DirectoryStore for PgDirectoryStore {
    async fn eligible_destinations(&self) -> Result<Vec<Destination>, StoreError> {
        let rows = self.client.query(ELIGIBLE_DESTINATIONS_SQL, &[]).await?;
        let destinations = rows
            .iter()
            .map(|row| {
                let channel: i64 = row.try_get("channel_id")?;
                let owner: String = row.try_get("user_id")?;
                Ok(Destination::new(ChannelId(channel), owner))
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()?;
        Ok(destinations)
    }

    async fn link_overrides(&self) -> Result<Vec<LinkOverride>, StoreError> {
        let rows = self.client.query(LINK_OVERRIDES_SQL, &[]).await?;
        let overrides = rows
            .iter()
            .map(|row| {
                let owner: String = row.try_get("user_id")?;
                let channel: i64 = row.try_get("channel_id")?;
                let code: String = row.try_get("link_code")?;
                let url: String = row.try_get("link_url")?;
                Ok(LinkOverride::new(owner, ChannelId(channel), code, url))
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()?;
        Ok(overrides)
    }
}
