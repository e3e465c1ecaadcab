//! Per-channel last-processed sequence tracking.
//!
//! Two feeds (push and poll) observe the same channels; both consult and
//! advance the same per-channel position. `accept` advances the position
//! before the message is processed, which closes the race where both feeds
//! observe the same message.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{ChannelId, SeqNo};

/// Tracks the last processed sequence number per source channel.
#[derive(Debug, Default)]
pub struct SeqTracker {
    positions: Mutex<HashMap<ChannelId, SeqNo>>,
}

impl SeqTracker {
    pub fn new() -> Self {
        SeqTracker::default()
    }

    /// Claims `seq` for processing iff it is strictly greater than the
    /// channel's current position, advancing the position in the same
    /// critical section. Returns whether the message should be processed.
    pub fn accept(&self, channel: ChannelId, seq: SeqNo) -> bool {
        let mut positions = self.positions.lock().expect("seq tracker lock poisoned");
        let current = positions.entry(channel).or_insert(SeqNo::ZERO);
        if seq > *current {
            *current = seq;
            true
        } else {
            false
        }
    }

    /// Sets a channel's starting position (the latest message seen at
    /// startup), so old history is never re-processed.
    pub fn prime(&self, channel: ChannelId, seq: SeqNo) {
        let mut positions = self.positions.lock().expect("seq tracker lock poisoned");
        positions.insert(channel, seq);
    }

    /// The channel's current position; `SeqNo::ZERO` if never seen.
    pub fn position(&self, channel: ChannelId) -> SeqNo {
        let positions = self.positions.lock().expect("seq tracker lock poisoned");
        positions.get(&channel).copied().unwrap_or(SeqNo::ZERO)
    }
}
