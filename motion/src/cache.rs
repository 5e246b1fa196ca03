//! Result cache: serve results keyed by `(flow_key, version, fingerprint)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use motion_core::CacheEntryKey;

/// A cached serve result with an absolute expiry.
///
/// Mirrors `hitbox_core::CacheValue`'s `expire` field: the cache never
/// extrapolates a relative TTL at lookup time, only compares against a
/// fixed point computed at insert time.
#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// An in-process cache of serve results.
///
/// Every `N`th insert opportunistically sweeps expired entries (mirroring
/// the texture of `OffloadManager::cleanup_finished`) so memory doesn't grow
/// unbounded from entries nobody ever looks up again after they expire.
pub struct ResultCache<T> {
    entries: DashMap<CacheEntryKey, CacheEntry<T>>,
    inserts: AtomicU64,
    sweep_every: u64,
}

impl<T: Clone> ResultCache<T> {
    /// Creates an empty result cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inserts: AtomicU64::new(0),
            sweep_every: 128,
        }
    }

    /// Looks up a cached value, returning `None` on miss or if the entry has
    /// expired (an expired entry found on lookup is evicted immediately,
    /// independent of the lazy sweep).
    pub fn get(&self, key: &CacheEntryKey) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Utc::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Inserts `value` under `key` with an absolute expiry of `now + ttl`.
    pub fn insert(&self, key: CacheEntryKey, value: T, ttl: Duration) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self.entries.insert(key, CacheEntry { value, expires_at });

        let count = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.sweep_every == 0 {
            self.sweep();
        }
    }

    /// Drops every cache entry whose key's flow matches `flow_key`.
    ///
    /// Called when an update batch bumps the version for a flow, so stale
    /// entries keyed at the old version are not merely orphaned but actually
    /// reclaimed promptly rather than waiting for the lazy sweep.
    pub fn invalidate_flow(&self, flow_key: &str) {
        self.entries.retain(|key, _| key.flow_key() != flow_key);
    }

    fn sweep(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl<T: Clone> Default for ResultCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_core::Fingerprint;

    fn key(version: u64) -> CacheEntryKey {
        let fingerprint = Fingerprint::compute("flow", &serde_json::json!({"v": 1})).unwrap();
        CacheEntryKey::new("flow".into(), version, fingerprint)
    }

    #[test]
    fn hit_then_expired_entry_is_evicted() {
        let cache = ResultCache::new();
        cache.insert(key(1), "value", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn different_versions_do_not_collide() {
        let cache = ResultCache::new();
        cache.insert(key(1), "a", Duration::from_secs(60));
        cache.insert(key(2), "b", Duration::from_secs(60));
        assert_eq!(cache.get(&key(1)), Some("a"));
        assert_eq!(cache.get(&key(2)), Some("b"));
    }

    #[test]
    fn invalidate_flow_drops_only_matching_entries() {
        let cache = ResultCache::new();
        cache.insert(key(1), "a", Duration::from_secs(60));
        let other_fingerprint = Fingerprint::compute("other", &serde_json::json!({})).unwrap();
        cache.insert(
            CacheEntryKey::new("other".into(), 1, other_fingerprint),
            "b",
            Duration::from_secs(60),
        );
        cache.invalidate_flow("flow");
        assert_eq!(cache.get(&key(1)), None);
    }
}
