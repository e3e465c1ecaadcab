//! Bot API client for the messaging platform.
//!
//! This is the crate's only HTTP surface: a thin wrapper over the JSON Bot
//! API providing the send operation for the broadcaster and the update/chat
//! operations the source feed adapter needs. Everything else in the pipeline
//! talks to the [`crate::broadcast::Outbound`] and
//! [`crate::ingest::SourceFeed`] traits, never to this client directly.

pub mod feed;

pub use feed::UpdatesFeed;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broadcast::Outbound;
use crate::ingest::FeedError;
use crate::types::{ChannelId, SendFailure};

/// Request timeout for ordinary API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for all API calls.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Extra allowance on top of the long-poll timeout for `getUpdates`.
const LONG_POLL_GRACE_SECS: u64 = 10;

/// Every Bot API response arrives in this envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdatesPayload {
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct ChatRefPayload {
    chat_id: i64,
}

/// One update from `getUpdates`. Only channel posts are of interest; every
/// other update kind deserializes with `channel_post: None` and is skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub channel_post: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

/// Minimal Bot API client.
#[derive(Clone)]
pub struct BotApi {
    http: reqwest::Client,
    base: String,
}

impl BotApi {
    /// Creates a client for the hosted Bot API.
    pub fn new(token: &str) -> Result<Self, reqwest::Error> {
        Self::with_base_url(format!("https://api.telegram.org/bot{token}"))
    }

    /// Creates a client against an arbitrary base URL (local API servers,
    /// test fixtures).
    pub fn with_base_url(base: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(BotApi {
            http,
            base: base.into(),
        })
    }

    /// Sends a text message to a channel.
    ///
    /// The code token is rendered as inline code by the composer, so messages
    /// go out with Markdown parsing and without link previews.
    pub async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), SendFailure> {
        let payload = SendMessagePayload {
            chat_id: channel.0,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(format!("{}/sendMessage", self.base))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendFailure::transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| SendFailure::transport(e.to_string()))?;

        if envelope.ok {
            Ok(())
        } else {
            Err(SendFailure::api(
                envelope.error_code,
                envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }

    /// Long-polls for updates at or after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, FeedError> {
        let payload = GetUpdatesPayload {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["channel_post"],
        };

        let envelope: ApiEnvelope<Vec<Update>> = self
            .http
            .post(format!("{}/getUpdates", self.base))
            .timeout(Duration::from_secs(timeout_secs + LONG_POLL_GRACE_SECS))
            .json(&payload)
            .send()
            .await
            .map_err(FeedError::transport)?
            .json()
            .await
            .map_err(FeedError::transport)?;

        Self::unwrap_envelope(envelope).map(|updates| updates.unwrap_or_default())
    }

    /// Verifies the bot can see a channel.
    pub async fn get_chat(&self, channel: ChannelId) -> Result<(), FeedError> {
        let payload = ChatRefPayload { chat_id: channel.0 };
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(format!("{}/getChat", self.base))
            .json(&payload)
            .send()
            .await
            .map_err(FeedError::transport)?
            .json()
            .await
            .map_err(FeedError::transport)?;
        Self::unwrap_envelope(envelope).map(|_| ())
    }

    /// Liveness check: confirms the session is still valid.
    pub async fn get_me(&self) -> Result<(), FeedError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(format!("{}/getMe", self.base))
            .send()
            .await
            .map_err(FeedError::transport)?
            .json()
            .await
            .map_err(FeedError::transport)?;
        Self::unwrap_envelope(envelope).map(|_| ())
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<Option<T>, FeedError> {
        if envelope.ok {
            Ok(envelope.result)
        } else {
            Err(FeedError::Api {
                code: envelope.error_code,
                description: envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The base URL embeds the bot token; don't leak it.
        f.debug_struct("BotApi").finish_non_exhaustive()
    }
}

impl Outbound for BotApi {
    async fn send_text(&self, channel: ChannelId, text: String) -> Result<(), SendFailure> {
        self.send_message(channel, &text).await
    }
}
