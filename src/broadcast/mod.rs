//! Concurrent fan-out of a recognized post to every eligible destination.
//!
//! For each destination the broadcaster resolves the per-destination link,
//! composes the outbound text, and dispatches one delivery attempt. All
//! attempts for one broadcast are issued concurrently and the summary is
//! computed only after every attempt has settled; a fault in one delivery
//! never aborts the others.
//!
//! Retry is not this component's job: timeouts and transport errors are
//! captured as failed outcomes and left at that.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::directory::DirectorySnapshot;
use crate::recognize::ParsedPost;
use crate::types::{BroadcastSummary, ChannelId, DeliveryOutcome, SendFailure};

/// The outbound messaging transport: one "send text to channel" operation
/// with a structured ok/error result.
pub trait Outbound {
    fn send_text(
        &self,
        channel: ChannelId,
        text: String,
    ) -> impl Future<Output = Result<(), SendFailure>> + Send;
}

/// Composes the outbound message body: the code as an inline-code token, a
/// blank line, then the resolved link.
pub fn compose_message(code: &str, link: &str) -> String {
    format!("`{code}`\n\n{link}")
}

/// Fans a post out to every destination in a directory snapshot.
pub struct Broadcaster<O> {
    outbound: Arc<O>,
}

impl<O: Outbound + Send + Sync + 'static> Broadcaster<O> {
    pub fn new(outbound: Arc<O>) -> Self {
        Broadcaster { outbound }
    }

    /// Delivers `post` to every destination in `snapshot`, returning the
    /// aggregated summary once every attempt has settled.
    ///
    /// An empty destination set is not an error: it logs a warning and
    /// returns a zero summary.
    pub async fn broadcast(
        &self,
        post: &ParsedPost,
        snapshot: &DirectorySnapshot,
    ) -> BroadcastSummary {
        if snapshot.is_empty() {
            warn!(code = %post.code, "no eligible destinations, nothing to broadcast");
            return BroadcastSummary::empty();
        }

        info!(
            code = %post.code,
            destinations = snapshot.len(),
            "broadcast starting"
        );

        // Spawn every attempt up front so they run concurrently, keeping the
        // destination id alongside each handle for fault attribution.
        let mut attempts = Vec::with_capacity(snapshot.len());
        for destination in snapshot.destinations() {
            let channel = destination.channel;
            let link = snapshot.resolve_link(channel, &post.code, &post.link);
            let text = compose_message(&post.code, link);
            let outbound = Arc::clone(&self.outbound);
            let code = post.code.clone();

            let handle = tokio::spawn(async move {
                match outbound.send_text(channel, text).await {
                    Ok(()) => {
                        info!(destination = %channel, code = %code, "delivery succeeded");
                        DeliveryOutcome::succeeded(channel)
                    }
                    Err(failure) => {
                        warn!(
                            destination = %channel,
                            code = %code,
                            error = %failure,
                            "delivery failed"
                        );
                        DeliveryOutcome::failed(channel, failure)
                    }
                }
            });
            attempts.push((channel, handle));
        }

        let mut summary = BroadcastSummary::empty();
        for (channel, handle) in attempts {
            // A panicked delivery task normalizes into a failed outcome.
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => DeliveryOutcome::failed(
                    channel,
                    SendFailure::transport(format!("delivery task fault: {join_error}")),
                ),
            };
            summary.record(&outcome);
        }

        info!(
            code = %post.code,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "broadcast complete"
        );
        summary
    }
}
