//! Immutable snapshot of eligible destinations and link overrides.
//!
//! A snapshot is built from one refresh's view of the store and never mutated
//! afterwards; readers hold an `Arc` and can never observe a half-refreshed
//! directory.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{ChannelId, UserId};

/// An eligible destination channel and its owning user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub channel: ChannelId,
    pub owner: UserId,
}

impl Destination {
    pub fn new(channel: ChannelId, owner: impl Into<UserId>) -> Self {
        Destination {
            channel,
            owner: owner.into(),
        }
    }
}

/// One link-override row from the store.
///
/// `code` is stored lowercased; lookup is by substring containment of the
/// code inside the observed code or link, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOverride {
    pub owner: UserId,
    pub channel: ChannelId,
    pub code: String,
    pub url: String,
}

impl LinkOverride {
    pub fn new(
        owner: impl Into<UserId>,
        channel: ChannelId,
        code: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        LinkOverride {
            owner: owner.into(),
            channel,
            code: code.into().to_lowercase(),
            url: url.into(),
        }
    }
}

/// A complete, consistent view of the destination directory.
///
/// Override tables are ordered maps, so a lookup that matches several override
/// codes deterministically returns the first in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    destinations: Vec<Destination>,
    owners: BTreeMap<ChannelId, UserId>,
    overrides: BTreeMap<(UserId, ChannelId), BTreeMap<String, String>>,
    pub refreshed_at: DateTime<Utc>,
}

impl Default for DirectorySnapshot {
    fn default() -> Self {
        Self::build(Vec::new(), Vec::new())
    }
}

impl DirectorySnapshot {
    /// Builds a snapshot from one refresh's query results.
    pub fn build(destinations: Vec<Destination>, overrides: Vec<LinkOverride>) -> Self {
        let owners = destinations
            .iter()
            .map(|d| (d.channel, d.owner.clone()))
            .collect();

        let mut override_map: BTreeMap<(UserId, ChannelId), BTreeMap<String, String>> =
            BTreeMap::new();
        for row in overrides {
            override_map
                .entry((row.owner, row.channel))
                .or_default()
                .insert(row.code, row.url);
        }

        DirectorySnapshot {
            destinations,
            owners,
            overrides: override_map,
            refreshed_at: Utc::now(),
        }
    }

    /// The eligible destinations, in the order the store returned them.
    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Resolves the link to send to `destination` for a given code.
    ///
    /// Returns the first override URL (ascending key order) whose code is a
    /// case-insensitive substring of the observed code or the original link.
    /// With no owner, no override table, or no match, the original link is
    /// returned unchanged.
    pub fn resolve_link<'a>(
        &'a self,
        destination: ChannelId,
        code: &str,
        original_link: &'a str,
    ) -> &'a str {
        let Some(owner) = self.owners.get(&destination) else {
            return original_link;
        };
        let Some(table) = self.overrides.get(&(owner.clone(), destination)) else {
            return original_link;
        };

        let code_lower = code.to_lowercase();
        let link_lower = original_link.to_lowercase();
        for (override_code, url) in table {
            if code_lower.contains(override_code.as_str())
                || link_lower.contains(override_code.as_str())
            {
                return url;
            }
        }
        original_link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_override(code: &str, url: &str) -> DirectorySnapshot {
        DirectorySnapshot::build(
            vec![Destination::new(ChannelId(10), "user-a")],
            vec![LinkOverride::new("user-a", ChannelId(10), code, url)],
        )
    }

    #[test]
    fn no_override_returns_original_link() {
        let snapshot = DirectorySnapshot::build(
            vec![Destination::new(ChannelId(10), "user-a")],
            Vec::new(),
        );
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "KOD1", "example.com/go"),
            "example.com/go"
        );
    }

    #[test]
    fn unknown_destination_returns_original_link() {
        let snapshot = snapshot_with_override("kod", "https://custom.example/x");
        assert_eq!(
            snapshot.resolve_link(ChannelId(99), "KOD1", "example.com"),
            "example.com"
        );
    }

    #[test]
    fn override_matching_code_substring_applies() {
        let snapshot = snapshot_with_override("kod", "https://custom.example/x");
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "KOD123", "example.com"),
            "https://custom.example/x"
        );
    }

    #[test]
    fn override_matching_link_substring_applies() {
        let snapshot = snapshot_with_override("jojobet", "https://ref.example/me");
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "ABC-1", "https://jojobet55.com/bonus"),
            "https://ref.example/me"
        );
    }

    #[test]
    fn override_match_is_case_insensitive() {
        let snapshot = snapshot_with_override("KoD", "https://custom.example/x");
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "kod777", "example.com"),
            "https://custom.example/x"
        );
    }

    #[test]
    fn no_matching_override_returns_original_link() {
        let snapshot = snapshot_with_override("grand", "https://custom.example/x");
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "KOD1", "example.com"),
            "example.com"
        );
    }

    #[test]
    fn multiple_matches_resolve_in_key_order() {
        let snapshot = DirectorySnapshot::build(
            vec![Destination::new(ChannelId(10), "user-a")],
            vec![
                LinkOverride::new("user-a", ChannelId(10), "kod12", "https://b.example"),
                LinkOverride::new("user-a", ChannelId(10), "kod", "https://a.example"),
            ],
        );
        // Both codes match "KOD123"; "kod" sorts before "kod12".
        assert_eq!(
            snapshot.resolve_link(ChannelId(10), "KOD123", "example.com"),
            "https://a.example"
        );
    }

    #[test]
    fn overrides_are_scoped_per_destination() {
        let snapshot = DirectorySnapshot::build(
            vec![
                Destination::new(ChannelId(10), "user-a"),
                Destination::new(ChannelId(20), "user-b"),
            ],
            vec![LinkOverride::new(
                "user-a",
                ChannelId(10),
                "kod",
                "https://a.example",
            )],
        );
        assert_eq!(
            snapshot.resolve_link(ChannelId(20), "KOD1", "example.com"),
            "example.com"
        );
    }
}
