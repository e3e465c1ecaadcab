//! Time-bounded cache of recently broadcast codes.
//!
//! A code present in the cache with an entry younger than the TTL must never
//! be broadcast again; entries older than the TTL are logically absent even
//! before eviction removes them. Eviction happens three ways, all idempotent:
//!
//! - lazily, when `is_sent` observes an expired entry;
//! - opportunistically, with a full sweep when the cache grows past the
//!   high-water mark;
//! - periodically, when the maintenance loop calls `sweep`.
//!
//! All mutation serializes behind one lock, so readers see either the pre- or
//! post-sweep state, never a torn one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Default TTL for broadcast codes (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default cache size that triggers an opportunistic full sweep.
pub const DEFAULT_HIGH_WATER: usize = 5000;

/// Cache of recently broadcast codes with TTL-based expiry.
#[derive(Debug)]
pub struct DedupCache {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    high_water: usize,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_HIGH_WATER)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration, high_water: usize) -> Self {
        DedupCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            high_water,
        }
    }

    /// Returns true iff `code` was marked sent less than the TTL ago.
    ///
    /// An expired entry is removed as a side effect and reported as unsent.
    pub fn is_sent(&self, code: &str) -> bool {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        match entries.get(code) {
            Some(marked_at) if marked_at.elapsed() < self.ttl => true,
            Some(_) => {
                entries.remove(code);
                false
            }
            None => false,
        }
    }

    /// Unconditionally (re)inserts `code` with the current time.
    ///
    /// If the cache has grown past the high-water mark, a full sweep of
    /// expired entries runs before returning.
    pub fn mark_sent(&self, code: &str) {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        entries.insert(code.to_string(), Instant::now());

        if entries.len() > self.high_water {
            let removed = Self::sweep_expired(&mut entries, self.ttl);
            debug!(
                removed,
                remaining = entries.len(),
                "dedup cache passed high-water mark, swept expired codes"
            );
        }
    }

    /// Removes all expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        Self::sweep_expired(&mut entries, self.ttl)
    }

    /// Number of entries currently held, including not-yet-evicted expired ones.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_expired(entries: &mut HashMap<String, Instant>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, marked_at| marked_at.elapsed() < ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsent_code_is_not_sent() {
        let cache = DedupCache::default();
        assert!(!cache.is_sent("KOD123"));
    }

    #[test]
    fn marked_code_is_sent() {
        let cache = DedupCache::default();
        cache.mark_sent("KOD123");
        assert!(cache.is_sent("KOD123"));
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let cache = DedupCache::default();
        cache.mark_sent("KOD123");
        cache.mark_sent("KOD123");
        assert!(cache.is_sent("KOD123"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_code_reads_as_unsent_and_is_evicted() {
        // Zero TTL: every entry is expired the moment it is inserted.
        let cache = DedupCache::new(Duration::ZERO, DEFAULT_HIGH_WATER);
        cache.mark_sent("KOD123");
        assert_eq!(cache.len(), 1);

        assert!(!cache.is_sent("KOD123"));
        assert_eq!(cache.len(), 0, "lazy eviction should remove the entry");

        // A subsequent mark succeeds again.
        cache.mark_sent("KOD123");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = DedupCache::default();
        cache.mark_sent("FRESH");
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);

        let expired = DedupCache::new(Duration::ZERO, DEFAULT_HIGH_WATER);
        expired.mark_sent("OLD1");
        expired.mark_sent("OLD2");
        assert_eq!(expired.sweep(), 2);
        assert!(expired.is_empty());
    }

    #[test]
    fn high_water_mark_triggers_sweep() {
        let cache = DedupCache::new(Duration::ZERO, 2);
        cache.mark_sent("A");
        cache.mark_sent("B");
        cache.mark_sent("C");
        // Inserting C pushed the cache past the mark; the sweep removed the
        // already-expired entries.
        assert!(cache.len() <= 2);
    }

    #[test]
    fn distinct_codes_are_independent() {
        let cache = DedupCache::default();
        cache.mark_sent("KOD1");
        assert!(cache.is_sent("KOD1"));
        assert!(!cache.is_sent("KOD2"));
    }
}
