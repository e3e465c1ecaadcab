//! The ingestion loop: merging two feeds into one ordered stream per channel.
//!
//! Two concurrent feeds observe the same source channels:
//!
//! - a **push feed** delivering new-message notifications as they occur, and
//! - a **pull feed** periodically fetching the most recent few messages per
//!   channel.
//!
//! Both feeds go through the same [`SeqTracker`], which accepts a message only
//! if its sequence number is strictly greater than the channel's last
//! processed position and advances the position before processing. Messages
//! are processed in ascending sequence order within a channel; ordering across
//! channels is neither guaranteed nor required.
//!
//! The loop also drives the periodic catch-up pass (re-synchronizing the push
//! feed's transport position) and the maintenance tick (dedup sweep plus
//! opportunistic directory refresh). A transport error on one channel is
//! logged and skipped; no single faulty iteration terminates the loop.

pub mod seq;

pub use seq::SeqTracker;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::Outbound;
use crate::directory::DirectoryStore;
use crate::relay::Relay;
use crate::types::{ChannelId, ChannelMessage, SeqNo};

/// Errors from the source transport.
///
/// These are transient by taxonomy: the affected channel or cycle is skipped
/// and the loop resumes on the next iteration.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("messaging api error: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },
}

impl FeedError {
    pub fn transport(error: impl std::fmt::Display) -> Self {
        FeedError::Transport(error.to_string())
    }
}

/// The source transport's read side.
pub trait SourceFeed {
    /// Verifies the channel is reachable and reports the latest sequence
    /// number observed there, if any. Called once per channel at startup.
    fn probe_channel(
        &self,
        channel: ChannelId,
    ) -> impl Future<Output = Result<Option<SeqNo>, FeedError>> + Send;

    /// The most recent messages on a channel with sequence numbers above
    /// `min_seq`, at most `limit`, in any order.
    fn recent_messages(
        &self,
        channel: ChannelId,
        min_seq: SeqNo,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChannelMessage>, FeedError>> + Send;

    /// Re-synchronizes the push feed's position with the transport without
    /// re-delivering already-processed messages.
    fn catch_up(&self) -> impl Future<Output = Result<(), FeedError>> + Send;
}

impl<T: SourceFeed + Send + Sync> SourceFeed for Arc<T> {
    fn probe_channel(
        &self,
        channel: ChannelId,
    ) -> impl Future<Output = Result<Option<SeqNo>, FeedError>> + Send {
        (**self).probe_channel(channel)
    }

    fn recent_messages(
        &self,
        channel: ChannelId,
        min_seq: SeqNo,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChannelMessage>, FeedError>> + Send {
        (**self).recent_messages(channel, min_seq, limit)
    }

    fn catch_up(&self) -> impl Future<Output = Result<(), FeedError>> + Send {
        (**self).catch_up()
    }
}

/// Merges the push and pull feeds and drives the relay pipeline.
pub struct Ingestor<F, S, O> {
    feed: F,
    relay: Arc<Relay<S, O>>,
    tracker: SeqTracker,
    sources: Vec<ChannelId>,
    inaccessible: HashSet<ChannelId>,
}

impl<F, S, O> Ingestor<F, S, O>
where
    F: SourceFeed,
    S: DirectoryStore + Send + Sync,
    O: Outbound + Send + Sync + 'static,
{
    pub fn new(feed: F, relay: Arc<Relay<S, O>>) -> Self {
        let sources = relay.config().sources.keys().copied().collect();
        Ingestor {
            feed,
            relay,
            tracker: SeqTracker::new(),
            sources,
            inaccessible: HashSet::new(),
        }
    }

    /// Checks access to every configured source channel, priming each
    /// channel's position with the latest message already there so history is
    /// never re-broadcast. Unreachable channels are marked inaccessible and
    /// skipped by the poll loop.
    pub async fn check_access(&mut self) {
        for &channel in &self.sources {
            let name = self.relay.config().source_name(channel);
            match self.feed.probe_channel(channel).await {
                Ok(latest) => {
                    if let Some(seq) = latest {
                        self.tracker.prime(channel, seq);
                    }
                    info!(channel = %channel, name = %name, "source channel reachable");
                }
                Err(error) => {
                    self.inaccessible.insert(channel);
                    error!(
                        channel = %channel,
                        name = %name,
                        error = %error,
                        "source channel inaccessible"
                    );
                }
            }
        }
        info!(
            reachable = self.sources.len() - self.inaccessible.len(),
            configured = self.sources.len(),
            "source channel access check complete"
        );
    }

    /// One pull pass over all accessible source channels.
    pub async fn poll_once(&self) {
        let limit = self.relay.config().poll_fetch_limit;
        for &channel in &self.sources {
            if self.inaccessible.contains(&channel) {
                continue;
            }

            let min_seq = self.tracker.position(channel);
            let mut messages = match self.feed.recent_messages(channel, min_seq, limit).await {
                Ok(messages) => messages,
                Err(error) => {
                    warn!(channel = %channel, error = %error, "poll fetch failed, skipping channel");
                    continue;
                }
            };

            messages.sort_by_key(|m| m.seq);
            for message in messages {
                if self.tracker.accept(message.channel, message.seq) {
                    self.relay.handle_message(message).await;
                }
            }
        }
    }

    /// Handles one push-feed notification.
    async fn handle_push(&self, message: ChannelMessage) {
        if !self.sources.contains(&message.channel) {
            debug!(channel = %message.channel, "push message from unwatched channel, ignoring");
            return;
        }
        if self.tracker.accept(message.channel, message.seq) {
            self.relay.handle_message(message).await;
        }
    }

    /// Runs the ingestion loop until the shutdown token fires.
    ///
    /// `rx` is the push feed. If it closes, ingestion degrades to polling
    /// only rather than stopping.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<ChannelMessage>,
        shutdown: CancellationToken,
    ) {
        let config = self.relay.config();
        let start = tokio::time::Instant::now();

        let mut poll = tokio::time::interval_at(start + config.poll_interval, config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut catch_up =
            tokio::time::interval_at(start + config.catch_up_interval, config.catch_up_interval);
        catch_up.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut maintenance = tokio::time::interval_at(
            start + config.maintenance_interval,
            config.maintenance_interval,
        );
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            sources = self.sources.len(),
            "ingestion loop started"
        );

        let mut push_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping ingestion loop");
                    break;
                }

                msg = rx.recv(), if push_open => {
                    match msg {
                        Some(message) => self.handle_push(message).await,
                        None => {
                            warn!("push feed closed, continuing with polling only");
                            push_open = false;
                        }
                    }
                }

                _ = poll.tick() => {
                    self.poll_once().await;
                }

                _ = catch_up.tick() => {
                    if let Err(error) = self.feed.catch_up().await {
                        warn!(error = %error, "catch-up pass failed");
                    }
                }

                _ = maintenance.tick() => {
                    self.relay.maintain().await;
                }
            }
        }

        info!("ingestion loop stopped");
    }
}
