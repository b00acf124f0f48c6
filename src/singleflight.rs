//! Request Deduplication (Singleflight)
//!
//! Collapses concurrent calls for the same key into one execution. The first
//! caller for a key becomes the leader and runs the call; every caller that
//! arrives while it is in flight subscribes to the leader's `watch` channel and
//! receives a clone of the same result.
//!
//! If a leader is cancelled before it publishes, its followers see the channel
//! close and race to become the next leader, so nobody waits forever.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::error::CacheResult;

type Slot<T> = Option<CacheResult<T>>;

struct Flight<T> {
    /// Distinguishes this flight from a later one for the same key
    id: u64,
    rx: watch::Receiver<Slot<T>>,
}

enum Role<T> {
    Leader(watch::Sender<Slot<T>>, u64),
    Follower(watch::Receiver<Slot<T>>),
}

/// RAII cleanup guard for in-flight tracking
///
/// Removes the leader's entry even on early return, panic or cancellation,
/// but never an entry that a newer flight has since installed.
struct CleanupGuard<'a, T> {
    map: &'a DashMap<String, Flight<T>>,
    key: &'a str,
    id: u64,
}

impl<T> Drop for CleanupGuard<'_, T> {
    fn drop(&mut self) {
        self.map.remove_if(self.key, |_, flight| flight.id == self.id);
    }
}

/// Per-key in-flight call collapser
pub struct Deduplicator<T> {
    in_flight: DashMap<String, Flight<T>>,
    next_id: AtomicU64,
    executed: AtomicU64,
    shared: AtomicU64,
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            next_id: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            shared: AtomicU64::new(0),
        }
    }

    /// Run `f` for `key` unless an identical call is already in flight.
    ///
    /// Returns the result and `was_shared`, which is `false` only for the
    /// caller that actually executed `f`.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> (CacheResult<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let (tx, id) = loop {
            match self.join_or_lead(key) {
                Role::Leader(tx, id) => break (tx, id),
                Role::Follower(mut rx) => {
                    if let Some(result) = Self::wait(&mut rx).await {
                        self.shared.fetch_add(1, Ordering::Relaxed);
                        return (result, true);
                    }
                    tracing::debug!(key = %key, "[Singleflight] Leader abandoned call, retrying");
                }
            }
        };

        let _cleanup = CleanupGuard {
            map: &self.in_flight,
            key,
            id,
        };

        let result = f().await;
        self.executed.fetch_add(1, Ordering::Relaxed);
        // Publish before the guard removes the entry so late joiners still see it.
        tx.send_replace(Some(result.clone()));
        (result, false)
    }

    fn join_or_lead(&self, key: &str) -> Role<T> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(flight) => Role::Follower(flight.get().rx.clone()),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(Flight { id, rx });
                Role::Leader(tx, id)
            }
        }
    }

    /// Wait for the leader's result; `None` if it went away without one
    async fn wait(rx: &mut watch::Receiver<Slot<T>>) -> Option<CacheResult<T>> {
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Keys currently being executed
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            executed: self.executed.load(Ordering::Relaxed),
            shared: self.shared.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }
}

impl<T> Default for Deduplicator<T>
where
    T: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Calls that actually ran
    pub executed: u64,
    /// Callers served by another caller's execution
    pub shared: u64,
    pub in_flight: usize,
}

impl DedupStats {
    /// Fraction of callers that were collapsed onto another execution
    #[must_use]
    pub fn collapse_ratio(&self) -> f64 {
        crate::l1_cache::ratio(self.shared, self.executed + self.shared)
    }
}
