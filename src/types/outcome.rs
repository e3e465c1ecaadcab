//! Per-destination delivery outcomes and broadcast summaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ChannelId;

/// A structured delivery failure, as reported by the outbound transport.
///
/// `code` is the transport's machine-readable error code when one was
/// returned; transport-level faults (timeouts, connection errors) and
/// unexpected task faults carry only a description.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct SendFailure {
    pub code: Option<i64>,
    pub description: String,
}

impl SendFailure {
    /// A failure reported by the messaging API itself.
    pub fn api(code: Option<i64>, description: impl Into<String>) -> Self {
        SendFailure {
            code,
            description: description.into(),
        }
    }

    /// A transport-level failure with no API error code.
    pub fn transport(description: impl Into<String>) -> Self {
        SendFailure {
            code: None,
            description: description.into(),
        }
    }
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.description),
            None => write!(f, "{}", self.description),
        }
    }
}

/// The result of one delivery attempt to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// The destination channel the attempt targeted.
    pub destination: ChannelId,

    /// Present iff the attempt failed.
    pub error: Option<SendFailure>,
}

impl DeliveryOutcome {
    pub fn succeeded(destination: ChannelId) -> Self {
        DeliveryOutcome {
            destination,
            error: None,
        }
    }

    pub fn failed(destination: ChannelId, error: SendFailure) -> Self {
        DeliveryOutcome {
            destination,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcome of one broadcast, computed after every attempt settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BroadcastSummary {
    /// The summary for a broadcast with nowhere to send.
    pub fn empty() -> Self {
        BroadcastSummary::default()
    }

    /// Folds a settled delivery outcome into the summary.
    pub fn record(&mut self, outcome: &DeliveryOutcome) {
        self.attempted += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for BroadcastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {} succeeded {} failed {}",
            self.attempted, self.succeeded, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_successes_and_failures() {
        let mut summary = BroadcastSummary::empty();
        summary.record(&DeliveryOutcome::succeeded(ChannelId(1)));
        summary.record(&DeliveryOutcome::failed(
            ChannelId(2),
            SendFailure::api(Some(403), "bot was kicked"),
        ));
        summary.record(&DeliveryOutcome::succeeded(ChannelId(3)));

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = BroadcastSummary::empty();
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn send_failure_display_includes_code_when_present() {
        let with_code = SendFailure::api(Some(400), "chat not found");
        assert_eq!(with_code.to_string(), "[400] chat not found");

        let without = SendFailure::transport("connection timed out");
        assert_eq!(without.to_string(), "connection timed out");
    }
}
