//! The canonical inbound message value.
//!
//! Both the push adapter and the poll adapter construct this type before
//! anything enters the ingestion loop, so the rest of the pipeline never sees
//! transport-specific message shapes.

use serde::{Deserialize, Serialize};

use super::{ChannelId, SeqNo};

/// A plain-text message observed on a source channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The source channel the message appeared on.
    pub channel: ChannelId,

    /// The message's sequence number within the channel.
    pub seq: SeqNo,

    /// The message body. Media-only messages arrive with an empty body and
    /// are rejected by the recognizer.
    pub text: String,
}

impl ChannelMessage {
    pub fn new(channel: ChannelId, seq: SeqNo, text: impl Into<String>) -> Self {
        ChannelMessage {
            channel,
            seq,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip() {
        let msg = ChannelMessage::new(ChannelId(-100), SeqNo(42), "KOD\nexample.com");
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, parsed);
    }
}
