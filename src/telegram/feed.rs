//! Source feed backed by `getUpdates` long-polling.
//!
//! The Bot API has no history endpoint, so both delivery paths observe the
//! same long-poll stream: every watched channel post is forwarded to the push
//! channel immediately AND retained in a bounded per-channel buffer that the
//! poller reads through [`crate::ingest::SourceFeed::recent_messages`]. The
//! sequence tracker downstream collapses the resulting duplicates, and the
//! buffer covers the window where a push delivery is lost (receiver lagging,
//! handler skipped during a refresh stall).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::BotApi;
use crate::ingest::{FeedError, SourceFeed};
use crate::types::{ChannelId, ChannelMessage, SeqNo};

/// Long-poll timeout handed to `getUpdates`.
const LONG_POLL_TIMEOUT_SECS: u64 = 25;

/// Back-off after a failed `getUpdates` round.
const FETCH_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Per-channel retention for the pull side. Sized well above the poller's
/// fetch limit; older entries have either been delivered or lapsed.
const BUFFER_CAP: usize = 32;

/// Update stream adapter: one long-poll loop feeding both delivery paths.
pub struct UpdatesFeed {
    api: BotApi,
    watched: HashSet<ChannelId>,
    // Next update id to request; None until the first batch arrives.
    offset: Mutex<Option<i64>>,
    buffers: Mutex<HashMap<ChannelId, VecDeque<ChannelMessage>>>,
    push_tx: mpsc::Sender<ChannelMessage>,
}

impl UpdatesFeed {
    pub fn new(
        api: BotApi,
        watched: impl IntoIterator<Item = ChannelId>,
        push_tx: mpsc::Sender<ChannelMessage>,
    ) -> Self {
        UpdatesFeed {
            api,
            watched: watched.into_iter().collect(),
            offset: Mutex::new(None),
            buffers: Mutex::new(HashMap::new()),
            push_tx,
        }
    }

    /// Drives the long-poll loop until `shutdown` is cancelled.
    ///
    /// Fetch failures are logged and retried after a short delay; the loop
    /// never exits on its own.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            let offset = *self.offset.lock().expect("offset lock poisoned");
            let batch = tokio::select! {
                () = shutdown.cancelled() => return,
                result = self.api.get_updates(offset, LONG_POLL_TIMEOUT_SECS) => result,
            };

            match batch {
                Ok(updates) => {
                    for message in self.absorb(updates) {
                        if self.push_tx.send(message).await.is_err() {
                            // Receiver gone; the pull buffers still serve the
                            // poller, so keep absorbing.
                            debug!("push receiver closed, continuing in pull-only mode");
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "update fetch failed");
                    tokio::select! {
                        () = shutdown.cancelled() => return,
                        () = tokio::time::sleep(FETCH_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    /// Advances the offset past `updates` and buffers every watched channel
    /// post, returning them in arrival order for push delivery.
    fn absorb(&self, updates: Vec<super::Update>) -> Vec<ChannelMessage> {
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            let mut offset = self.offset.lock().expect("offset lock poisoned");
            *offset = Some(offset.unwrap_or(i64::MIN).max(last + 1));
        }

        let mut accepted = Vec::new();
        let mut buffers = self.buffers.lock().expect("buffer lock poisoned");
        for update in updates {
            let Some(post) = update.channel_post else {
                continue;
            };
            let channel = ChannelId(post.chat.id);
            if !self.watched.contains(&channel) {
                continue;
            }
            let message = ChannelMessage::new(
                channel,
                SeqNo(post.message_id),
                post.text.unwrap_or_default(),
            );

            let buffer = buffers.entry(channel).or_default();
            buffer.push_back(message.clone());
            while buffer.len() > BUFFER_CAP {
                buffer.pop_front();
            }
            accepted.push(message);
        }
        accepted
    }
}

impl SourceFeed for UpdatesFeed {
    /// There is no history to read, so accessibility is all a probe can
    /// establish: reachable channels start from an empty position and pick up
    /// with the next live post.
    async fn probe_channel(&self, channel: ChannelId) -> Result<Option<SeqNo>, FeedError> {
        self.api.get_chat(channel).await?;
        Ok(None)
    }

    async fn recent_messages(
        &self,
        channel: ChannelId,
        min_seq: SeqNo,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>, FeedError> {
        let buffers = self.buffers.lock().expect("buffer lock poisoned");
        let mut messages: Vec<ChannelMessage> = buffers
            .get(&channel)
            .map(|buffer| {
                buffer
                    .iter()
                    .filter(|m| m.seq > min_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by_key(|m| m.seq);
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    async fn catch_up(&self) -> Result<(), FeedError> {
        self.api.get_me().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{TgChat, TgMessage, Update};

    fn feed_with_sources(sources: &[i64]) -> (UpdatesFeed, mpsc::Receiver<ChannelMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let api = BotApi::with_base_url("http://localhost:1/bot").unwrap();
        let feed = UpdatesFeed::new(api, sources.iter().copied().map(ChannelId), tx);
        (feed, rx)
    }

    fn post(update_id: i64, chat: i64, message_id: i64, text: &str) -> Update {
        Update {
            update_id,
            channel_post: Some(TgMessage {
                message_id,
                chat: TgChat { id: chat },
                text: Some(text.to_string()),
            }),
        }
    }

    #[test]
    fn absorb_buffers_watched_posts_and_advances_offset() {
        let (feed, _rx) = feed_with_sources(&[-100]);

        let accepted = feed.absorb(vec![
            post(10, -100, 5, "KOD\nexample.com"),
            post(11, -100, 6, "IKINCI\nexample.com"),
        ]);
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].seq, SeqNo(5));
        assert_eq!(*feed.offset.lock().unwrap(), Some(12));
    }

    #[test]
    fn absorb_skips_unwatched_channels_and_bare_updates() {
        let (feed, _rx) = feed_with_sources(&[-100]);

        let accepted = feed.absorb(vec![
            post(1, -999, 5, "KOD\nexample.com"),
            Update {
                update_id: 2,
                channel_post: None,
            },
        ]);
        assert!(accepted.is_empty());
        // Offset still advances so skipped updates are not refetched.
        assert_eq!(*feed.offset.lock().unwrap(), Some(3));
    }

    #[test]
    fn absorb_maps_missing_text_to_empty_body() {
        let (feed, _rx) = feed_with_sources(&[-100]);

        let accepted = feed.absorb(vec![Update {
            update_id: 1,
            channel_post: Some(TgMessage {
                message_id: 9,
                chat: TgChat { id: -100 },
                text: None,
            }),
        }]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].text, "");
    }

    #[test]
    fn buffer_is_bounded() {
        let (feed, _rx) = feed_with_sources(&[-100]);

        for i in 0..(BUFFER_CAP as i64 + 10) {
            feed.absorb(vec![post(i, -100, i, "KOD\nexample.com")]);
        }
        let buffers = feed.buffers.lock().unwrap();
        assert_eq!(buffers[&ChannelId(-100)].len(), BUFFER_CAP);
        // Oldest entries were dropped.
        assert_eq!(buffers[&ChannelId(-100)].front().unwrap().seq, SeqNo(10));
    }

    #[tokio::test]
    async fn recent_messages_filters_sorts_and_limits() {
        let (feed, _rx) = feed_with_sources(&[-100]);
        feed.absorb(vec![
            post(1, -100, 3, "a"),
            post(2, -100, 1, "b"),
            post(3, -100, 7, "c"),
            post(4, -100, 5, "d"),
        ]);

        let messages = feed
            .recent_messages(ChannelId(-100), SeqNo(1), 2)
            .await
            .unwrap();
        assert_eq!(
            messages.iter().map(|m| m.seq).collect::<Vec<_>>(),
            vec![SeqNo(5), SeqNo(7)]
        );
    }

    #[tokio::test]
    async fn recent_messages_for_unknown_channel_is_empty() {
        let (feed, _rx) = feed_with_sources(&[-100]);
        let messages = feed
            .recent_messages(ChannelId(-200), SeqNo::ZERO, 3)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }
}
