//! The coordinating pipeline component.
//!
//! One accepted message flows recognize → dedup check → mark → broadcast.
//! The relay owns the process-wide mutable state (dedup cache, destination
//! directory) and exposes only operations, never raw containers.
//!
//! Format rejections and duplicate codes are expected outcomes: logged at
//! informational level with a reason, never retried, never escalated.

use std::sync::Arc;

use tracing::info;

use crate::broadcast::{Broadcaster, Outbound};
use crate::config::RelayConfig;
use crate::dedup::DedupCache;
use crate::directory::{DestinationDirectory, DirectoryStore};
use crate::recognize::{RecognizerRules, recognize};
use crate::types::{BroadcastSummary, ChannelMessage};

/// The ingestion-to-broadcast pipeline.
pub struct Relay<S, O> {
    config: RelayConfig,
    rules: RecognizerRules,
    dedup: DedupCache,
    directory: DestinationDirectory<S>,
    broadcaster: Broadcaster<O>,
}

impl<S, O> Relay<S, O>
where
    S: DirectoryStore + Send + Sync,
    O: Outbound + Send + Sync + 'static,
{
    pub fn new(
        config: RelayConfig,
        dedup: DedupCache,
        directory: DestinationDirectory<S>,
        broadcaster: Broadcaster<O>,
    ) -> Self {
        let rules = RecognizerRules::new(config.keywords.clone(), config.banned_words.clone());
        Relay {
            config,
            rules,
            dedup,
            directory,
            broadcaster,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn directory(&self) -> &DestinationDirectory<S> {
        &self.directory
    }

    /// Processes one accepted message end to end. Returns the broadcast
    /// summary, `None` if the message was rejected or a duplicate.
    pub async fn handle_message(&self, message: ChannelMessage) -> Option<BroadcastSummary> {
        let source_name = self.config.source_name(message.channel);

        let post = match recognize(&message.text, &self.rules) {
            Ok(recognized) => recognized.with_source(message.channel),
            Err(rejection) => {
                info!(
                    source = %source_name,
                    seq = %message.seq,
                    reason = %rejection,
                    "message did not match post format"
                );
                return None;
            }
        };

        if self.dedup.is_sent(&post.code) {
            info!(
                source = %source_name,
                code = %post.code,
                "duplicate code within TTL, skipping broadcast"
            );
            return None;
        }

        info!(
            source = %source_name,
            format = %post.format,
            code = %post.code,
            link = %post.link,
            "post accepted"
        );

        // Mark before dispatch so a concurrent second observation of the same
        // code can never double-broadcast.
        self.dedup.mark_sent(&post.code);

        self.directory.refresh_if_due().await;
        let snapshot = self.directory.snapshot();
        Some(self.broadcaster.broadcast(&post, &snapshot).await)
    }

    /// Periodic maintenance: sweep expired dedup entries and refresh the
    /// directory if its interval has elapsed.
    pub async fn maintain(&self) {
        let removed = self.dedup.sweep();
        if removed > 0 {
            info!(removed, "swept expired dedup entries");
        }
        self.directory.refresh_if_due().await;
    }
}
