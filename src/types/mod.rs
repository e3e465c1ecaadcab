//! Core domain types for the relay bot.
//!
//! This module contains the fundamental types used throughout the application,
//! designed to encode invariants via the type system.

pub mod ids;
pub mod message;
pub mod outcome;

// Re-export commonly used types at the module level
pub use ids::{ChannelId, SeqNo, UserId};
pub use message::ChannelMessage;
pub use outcome::{BroadcastSummary, DeliveryOutcome, SendFailure};
