//! Process configuration.
//!
//! All configuration is supplied at startup and immutable thereafter: the
//! source channel map, the keyword and banned-word sets, and the pipeline's
//! intervals and cache bounds. Channel sets and word lists come from a JSON
//! config file; secrets (bot token, database URL) come from the environment
//! and are read in `main`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::ChannelId;

/// Default interval between poll passes over the source channels (2s).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default interval between push-feed catch-up passes (30s).
const DEFAULT_CATCH_UP_INTERVAL_SECS: u64 = 30;

/// Default interval between maintenance ticks: dedup sweep plus opportunistic
/// directory refresh (60s).
const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Default time a broadcast code stays deduplicated (1 hour).
const DEFAULT_DEDUP_TTL_SECS: u64 = 3600;

/// Default dedup cache size that triggers an opportunistic full sweep.
const DEFAULT_DEDUP_HIGH_WATER: usize = 5000;

/// Default minimum elapsed time between destination directory refreshes (5 min).
const DEFAULT_DIRECTORY_REFRESH_SECS: u64 = 300;

/// Default number of recent messages fetched per channel per poll pass.
const DEFAULT_POLL_FETCH_LIMIT: usize = 3;

/// Errors loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config lists no source channels")]
    NoSources,
}

/// On-disk shape of the config file. Interval fields are optional seconds.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    /// Source channel id -> display name.
    sources: BTreeMap<i64, String>,

    /// Keywords that may prefix a post (Format A).
    #[serde(default)]
    keywords: Vec<String>,

    /// Substrings that disqualify a code or link.
    #[serde(default)]
    banned_words: Vec<String>,

    #[serde(default)]
    poll_interval_secs: Option<u64>,
    #[serde(default)]
    catch_up_interval_secs: Option<u64>,
    #[serde(default)]
    maintenance_interval_secs: Option<u64>,
    #[serde(default)]
    dedup_ttl_secs: Option<u64>,
    #[serde(default)]
    dedup_high_water: Option<usize>,
    #[serde(default)]
    directory_refresh_secs: Option<u64>,
    #[serde(default)]
    poll_fetch_limit: Option<usize>,
}

/// Immutable runtime configuration for the relay.
///
/// Keyword and banned-word sets are stored lowercased in ordered sets, so
/// first-match lookups are deterministic (ascending lexicographic order).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Source channel id -> display name, used in log lines.
    pub sources: BTreeMap<ChannelId, String>,

    /// Lowercased keywords accepted as a Format A prefix line.
    pub keywords: BTreeSet<String>,

    /// Lowercased substrings that disqualify a code or link.
    pub banned_words: BTreeSet<String>,

    pub poll_interval: Duration,
    pub catch_up_interval: Duration,
    pub maintenance_interval: Duration,
    pub dedup_ttl: Duration,
    pub dedup_high_water: usize,
    pub directory_refresh_interval: Duration,
    pub poll_fetch_limit: usize,
}

impl RelayConfig {
    /// Creates a config with default intervals for the given source channels.
    pub fn new(sources: BTreeMap<ChannelId, String>) -> Self {
        RelayConfig {
            sources,
            keywords: BTreeSet::new(),
            banned_words: BTreeSet::new(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            catch_up_interval: Duration::from_secs(DEFAULT_CATCH_UP_INTERVAL_SECS),
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            dedup_ttl: Duration::from_secs(DEFAULT_DEDUP_TTL_SECS),
            dedup_high_water: DEFAULT_DEDUP_HIGH_WATER,
            directory_refresh_interval: Duration::from_secs(DEFAULT_DIRECTORY_REFRESH_SECS),
            poll_fetch_limit: DEFAULT_POLL_FETCH_LIMIT,
        }
    }

    /// Loads configuration from a JSON file, applying defaults for any
    /// interval not present.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let sources = file
            .sources
            .into_iter()
            .map(|(id, name)| (ChannelId(id), name))
            .collect();

        let mut config = RelayConfig::new(sources);
        config.keywords = file.keywords.iter().map(|k| k.to_lowercase()).collect();
        config.banned_words = file
            .banned_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();

        if let Some(secs) = file.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.catch_up_interval_secs {
            config.catch_up_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.maintenance_interval_secs {
            config.maintenance_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.dedup_ttl_secs {
            config.dedup_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = file.dedup_high_water {
            config.dedup_high_water = n;
        }
        if let Some(secs) = file.directory_refresh_secs {
            config.directory_refresh_interval = Duration::from_secs(secs);
        }
        if let Some(n) = file.poll_fetch_limit {
            config.poll_fetch_limit = n;
        }

        Ok(config)
    }

    /// Returns the display name for a source channel, falling back to the id.
    pub fn source_name(&self, channel: ChannelId) -> String {
        self.sources
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| channel.to_string())
    }
}
