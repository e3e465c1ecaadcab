//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! UserId where a ChannelId is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat channel identifier, as assigned by the messaging platform.
///
/// Both source and destination channels use this type. Channel ids are opaque;
/// the platform happens to use large negative numbers for channels, but nothing
/// here depends on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChannelId {
    fn from(n: i64) -> Self {
        ChannelId(n)
    }
}

/// A message sequence number, monotonically increasing per channel.
///
/// Used by the ingestion loop to decide whether a message observed by either
/// feed has already been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqNo(pub i64);

impl SeqNo {
    /// The position before any message has been seen on a channel.
    pub const ZERO: SeqNo = SeqNo(0);
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SeqNo {
    fn from(n: i64) -> Self {
        SeqNo(n)
    }
}

/// The identity of a destination channel's owning user in the relational store.
///
/// The store uses opaque text ids; no structure is assumed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        UserId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}
