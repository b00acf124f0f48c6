//! `DashMap` Backend - In-Process Remote Backend
//!
//! A concurrent `HashMap` implementing [`RemoteBackend`]. Used as the L2 store
//! for single-node deployments and as the reference backend in tests and
//! benches. It behaves like Redis where it matters to the cache: TTLs expire
//! lazily on read, missing keys are `Ok(None)`, and `scan_keys` understands
//! Redis glob syntax.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::CacheResult;
use crate::traits::RemoteBackend;

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Simple concurrent store using `DashMap`
///
/// **Limitations**:
/// - No size limits (unbounded growth)
/// - Expired entries are removed on access or by [`cleanup_expired`](Self::cleanup_expired)
///
/// **Example**:
/// ```rust
/// use tiered_cache::backends::DashMapBackend;
/// use tiered_cache::RemoteBackend;
/// use std::time::Duration;
///
/// # async fn example() -> tiered_cache::CacheResult<()> {
/// let store = DashMapBackend::new();
/// store.set_with_ttl("user:1", b"alice", Duration::from_secs(60)).await?;
/// assert_eq!(store.get("user:1").await?, Some(b"alice".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DashMapBackend {
    map: Arc<DashMap<String, StoredEntry>>,
    sets: Arc<AtomicU64>,
}

impl DashMapBackend {
    /// Create new `DashMap` backend
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing DashMap backend (in-process L2 store)");

        Self {
            map: Arc::new(DashMap::new()),
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[DashMap] Cleaned up expired entries");
        }
        removed
    }

    /// Value and remaining TTL of an unexpired entry; expired entries are dropped
    fn live_entry(&self, key: &str) -> Option<(Vec<u8>, Duration)> {
        let entry = self.map.get(key)?;
        if entry.is_expired() {
            drop(entry); // release the shard read lock before removing
            self.map.remove_if(key, |_, e| e.is_expired());
            return None;
        }
        Some((entry.value.clone(), entry.remaining()))
    }

    /// Number of stored entries, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total successful writes
    #[must_use]
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }
}

impl Default for DashMapBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteBackend for DashMapBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live_entry(key).map(|(value, _)| value))
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<Option<(Vec<u8>, Option<Duration>)>> {
        Ok(self
            .live_entry(key)
            .map(|(value, remaining)| (value, Some(remaining))))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.map
            .insert(key.to_string(), StoredEntry::new(value.to_vec(), ttl));
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = %ttl.as_millis(), "[DashMap] Stored key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> CacheResult<usize> {
        let removed = keys
            .iter()
            .filter_map(|key| self.map.remove(key))
            .filter(|(_, entry)| !entry.is_expired())
            .count();
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let keys: Vec<String> = self
            .map
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        debug!(pattern = %pattern, count = keys.len(), "[DashMap] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[a-z]`, `[^a]` and `\` escapes.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Position after the last `*` and the text position it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let current = text.get(t).copied();
        let step = match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match_class(&pattern, p, current),
            Some('\\') if p + 1 < pattern.len() => {
                (pattern.get(p + 1).copied() == current).then_some(p + 2)
            }
            Some(c) => (Some(c) == current).then_some(p + 1),
            None => None,
        };

        match (step, backtrack) {
            (Some(next), _) => {
                p = next;
                t += 1;
            }
            (None, Some((star_p, star_t))) => {
                p = star_p;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            }
            (None, None) => return false,
        }
    }

    pattern.get(p..).is_some_and(|rest| rest.iter().all(|c| *c == '*'))
}

/// Match a `[...]` class starting at `pattern[start]`; returns the index past `]`.
fn match_class(pattern: &[char], start: usize, c: Option<char>) -> Option<usize> {
    let c = c?;
    let mut i = start + 1;
    let negate = pattern.get(i).copied() == Some('^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let at = |offset: usize| pattern.get(i + offset).copied();
        match (at(0), at(1), at(2)) {
            (None, _, _) => return None, // unterminated class never matches
            (Some(']'), _, _) => break,
            (Some('\\'), Some(esc), _) => {
                matched |= esc == c;
                i += 2;
            }
            (Some(lo), Some('-'), Some(hi)) if hi != ']' => {
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            (Some(single), _, _) => {
                matched |= single == c;
                i += 1;
            }
        }
    }

    (matched != negate).then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("articles:list:*", "articles:list:page:3"));
        assert!(!glob_match("articles:list:*", "article:1"));
        assert!(glob_match("article:?", "article:1"));
        assert!(!glob_match("article:?", "article:12"));
        assert!(glob_match("article:[0-4]", "article:3"));
        assert!(!glob_match("article:[^0-4]", "article:3"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("lit\\*", "lit*"));
        assert!(!glob_match("lit\\*", "litx"));
        assert!(glob_match("", ""));
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_lazy_miss() {
        let store = DashMapBackend::new();
        store
            .set_with_ttl("k", b"v", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_with_ttl_reports_remaining_time() {
        let store = DashMapBackend::new();
        store
            .set_with_ttl("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        let (value, remaining) = store.get_with_ttl("k").await.unwrap().unwrap();
        assert_eq!(value, b"v".to_vec());
        let remaining = remaining.unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
        assert!(store.get_with_ttl("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_and_remove_many() {
        let store = DashMapBackend::new();
        for key in ["articles:list:1", "articles:list:2", "article:1"] {
            store
                .set_with_ttl(key, b"x", Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut keys = store.scan_keys("articles:list:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["articles:list:1", "articles:list:2"]);

        assert_eq!(store.remove_many(&keys).await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }
}
