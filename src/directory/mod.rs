//! The destination directory: which channels receive broadcasts, and with
//! which per-destination link overrides.
//!
//! The working set is refreshed periodically from the relational store and
//! swapped in atomically: both queries must succeed or the refresh aborts
//! wholesale, leaving the previous snapshot in effect. Refresh failures are
//! never fatal.
//!
//! Refreshes are opportunistic rather than timer-driven: callers on hot paths
//! invoke `refresh_if_due`, which does nothing until the configured interval
//! has elapsed since the last attempt.

pub mod snapshot;
pub mod store;

pub use snapshot::{Destination, DirectorySnapshot, LinkOverride};
pub use store::{DirectoryStore, PgDirectoryStore, StoreError};

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Cache of eligible destinations and overrides, refreshed from a store.
pub struct DestinationDirectory<S> {
    store: S,
    snapshot: RwLock<Arc<DirectorySnapshot>>,
    refresh_interval: Duration,
    last_attempt: Mutex<Option<Instant>>,
}

impl<S: DirectoryStore + Sync> DestinationDirectory<S> {
    /// Creates a directory with an empty snapshot. `refresh` should be
    /// attempted before the first broadcast.
    pub fn new(store: S, refresh_interval: Duration) -> Self {
        DestinationDirectory {
            store,
            snapshot: RwLock::new(Arc::new(DirectorySnapshot::default())),
            refresh_interval,
            last_attempt: Mutex::new(None),
        }
    }

    /// Reloads the eligible-destination set and override table from the store.
    ///
    /// Returns the new destination count. On any failure the previous
    /// snapshot stays in effect and the elapsed-interval clock still resets,
    /// so a dead store is retried once per interval rather than on every
    /// message.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        self.record_attempt();

        let destinations = self.store.eligible_destinations().await?;
        let overrides = self.store.link_overrides().await?;
        let next = DirectorySnapshot::build(destinations, overrides);
        let count = next.len();

        *self
            .snapshot
            .write()
            .expect("directory snapshot lock poisoned") = Arc::new(next);

        info!(destinations = count, "destination directory refreshed");
        Ok(count)
    }

    /// Refreshes if the configured interval has elapsed since the last
    /// attempt. Failures are logged and swallowed.
    pub async fn refresh_if_due(&self) {
        if !self.is_due() {
            return;
        }
        if let Err(error) = self.refresh().await {
            warn!(error = %error, "directory refresh failed, keeping previous snapshot");
        }
    }

    /// The current snapshot. Cheap; the returned `Arc` stays consistent even
    /// if a refresh lands while the caller is using it.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.snapshot
            .read()
            .expect("directory snapshot lock poisoned")
            .clone()
    }

    fn is_due(&self) -> bool {
        let last = self
            .last_attempt
            .lock()
            .expect("directory attempt lock poisoned");
        match *last {
            Some(at) => at.elapsed() > self.refresh_interval,
            None => true,
        }
    }

    fn record_attempt(&self) {
        *self
            .last_attempt
            .lock()
            .expect("directory attempt lock poisoned") = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scriptable in-memory store.
    struct MockStore {
        destinations: Mutex<Vec<Destination>>,
        overrides: Vec<LinkOverride>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockStore {
        fn with_destinations(destinations: Vec<Destination>) -> Self {
            MockStore {
                destinations: Mutex::new(destinations),
                overrides: Vec::new(),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DirectoryStore for MockStore {
        async fn eligible_destinations(&self) -> Result<Vec<Destination>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(self.destinations.lock().unwrap().clone())
        }

        async fn link_overrides(&self) -> Result<Vec<LinkOverride>, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(self.overrides.clone())
        }
    }

    fn two_destinations() -> Vec<Destination> {
        vec![
            Destination::new(ChannelId(10), "user-a"),
            Destination::new(ChannelId(20), "user-b"),
        ]
    }

    #[tokio::test]
    async fn refresh_populates_snapshot_and_returns_count() {
        let directory = DestinationDirectory::new(
            MockStore::with_destinations(two_destinations()),
            Duration::from_secs(300),
        );
        assert!(directory.snapshot().is_empty());

        let count = directory.refresh().await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(directory.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let store = MockStore::with_destinations(two_destinations());
        let directory = DestinationDirectory::new(store, Duration::from_secs(300));
        directory.refresh().await.unwrap();

        directory.store.fail.store(true, Ordering::SeqCst);
        assert!(directory.refresh().await.is_err());
        assert_eq!(
            directory.snapshot().len(),
            2,
            "previous snapshot must stay in effect"
        );
    }

    #[tokio::test]
    async fn reader_holding_snapshot_is_unaffected_by_refresh() {
        let store = MockStore::with_destinations(two_destinations());
        let directory = DestinationDirectory::new(store, Duration::from_secs(300));
        directory.refresh().await.unwrap();

        let held = directory.snapshot();
        *directory.store.destinations.lock().unwrap() =
            vec![Destination::new(ChannelId(30), "user-c")];
        directory.refresh().await.unwrap();

        // The held snapshot is the complete old view; a fresh read sees the
        // complete new one. No reader can see a mix.
        assert_eq!(held.len(), 2);
        assert_eq!(directory.snapshot().len(), 1);
        assert_eq!(
            directory.snapshot().destinations()[0].channel,
            ChannelId(30)
        );
    }

    #[tokio::test]
    async fn refresh_if_due_honors_interval() {
        let store = MockStore::with_destinations(two_destinations());
        let directory = DestinationDirectory::new(store, Duration::from_secs(300));

        // Never attempted: due immediately.
        directory.refresh_if_due().await;
        assert_eq!(directory.store.calls.load(Ordering::SeqCst), 1);

        // Just attempted: not due again.
        directory.refresh_if_due().await;
        assert_eq!(directory.store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_if_due_swallows_store_failure() {
        let store = MockStore::with_destinations(two_destinations());
        store.fail.store(true, Ordering::SeqCst);
        let directory = DestinationDirectory::new(store, Duration::from_secs(300));

        directory.refresh_if_due().await;
        assert!(directory.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_attempt_still_resets_interval() {
        let store = MockStore::with_destinations(two_destinations());
        store.fail.store(true, Ordering::SeqCst);
        let directory = DestinationDirectory::new(store, Duration::from_secs(300));

        directory.refresh_if_due().await;
        directory.refresh_if_due().await;
        assert_eq!(
            directory.store.calls.load(Ordering::SeqCst),
            1,
            "a dead store is retried once per interval, not per call"
        );
    }
}
