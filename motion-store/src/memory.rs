//! In-memory [`StateStore`] implementation.
//!
//! The Rust analogue of `hitbox-moka` standing in for a distributed backend
//! in tests and single-process deployments: a `dashmap`-backed store with
//! the same "lock-free reads, fine-grained locking for writes" texture as
//! the rest of this crate lineage (see `hitbox::concurrency`'s use of
//! `DashMap`'s entry API for atomic insert-if-absent).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::StoreError;
use crate::store::{LockToken, StateStore, StoreResult};

struct Entry_ {
    value: Bytes,
    expires_at: Option<Instant>,
}

struct LockEntry {
    token: Box<[u8]>,
    expires_at: Instant,
}

/// An in-process, non-durable [`StateStore`].
///
/// Values live only as long as the process — intended for tests and for
/// single-process deployments that don't need cross-process durability.
/// Locking is a per-name token-guarded entry rather than a real mutex, so
/// that the same `lock`/`unlock` contract as a distributed backend is
/// exercised in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, Entry_>,
    locks: DashMap<String, LockEntry>,
    channels: DashMap<String, broadcast::Sender<Bytes>>,
    lock_token_counter: AtomicU64,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<Bytes> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn next_token(&self) -> Box<[u8]> {
        let id = self.lock_token_counter.fetch_add(1, Ordering::Relaxed);
        Box::from(id.to_le_bytes())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let Some(entry) = self.values.get(key) else {
            return Ok(None);
        };
        if let Some(expires_at) = entry.expires_at
            && expires_at <= Instant::now()
        {
            drop(entry);
            self.values.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.values
            .insert(key.to_string(), Entry_ { value, expires_at });
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        // Incremented value lives in the same keyspace `get`/`set` read and
        // write, so a counter is visible through a plain `get` exactly as it
        // would be reading a Redis `INCR`-maintained key back with `GET`.
        let mut entry = self.values.entry(key.to_string()).or_insert_with(|| Entry_ {
            value: Bytes::from_static(b"0"),
            expires_at: None,
        });
        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        entry.value = Bytes::from(next.to_string());
        entry.expires_at = None;
        Ok(next)
    }

    async fn lock(&self, name: &str, ttl: Duration) -> StoreResult<LockToken> {
        let now = Instant::now();
        match self.locks.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    trace!(lock = name, "reclaiming orphaned expired lock");
                    let token = self.next_token();
                    occupied.insert(LockEntry {
                        token: token.clone(),
                        expires_at: now + ttl,
                    });
                    Ok(LockToken::new(token))
                } else {
                    Err(StoreError::LockContention {
                        name: name.to_string(),
                    })
                }
            }
            Entry::Vacant(vacant) => {
                let token = self.next_token();
                vacant.insert(LockEntry {
                    token: token.clone(),
                    expires_at: now + ttl,
                });
                Ok(LockToken::new(token))
            }
        }
    }

    async fn unlock(&self, name: &str, token: LockToken) -> StoreResult<()> {
        if let Entry::Occupied(occupied) = self.locks.entry(name.to_string())
            && occupied.get().token == token.as_bytes().into()
        {
            occupied.remove();
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, msg: Bytes) -> StoreResult<()> {
        // No receivers is not an error — matches spec.'s pub/sub semantics,
        // where flush barriers are only meaningful to whoever is waiting.
        let _ = self.channel(channel).send(msg);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, Bytes>> {
        let receiver = self.channel(channel).subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(msg) => return Some((msg, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store
            .set("k", Bytes::from_static(b"v"), None)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn set_with_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_creates_and_increments() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_unlocked() {
        let store = MemoryStore::new();
        let token = store.lock("l", Duration::from_secs(10)).await.unwrap();
        assert!(matches!(
            store.lock("l", Duration::from_secs(10)).await,
            Err(StoreError::LockContention { .. })
        ));
        store.unlock("l", token).await.unwrap();
        assert!(store.lock("l", Duration::from_secs(10)).await.is_ok());
    }

    #[tokio::test]
    async fn orphaned_lock_can_be_reclaimed_after_ttl() {
        let store = MemoryStore::new();
        let _token = store.lock("l", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.lock("l", Duration::from_secs(10)).await.is_ok());
    }

    #[tokio::test]
    async fn publish_subscribe_delivers_message() {
        let store = MemoryStore::new();
        let mut stream = store.subscribe("chan").await.unwrap();
        store
            .publish("chan", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let msg = stream.next().await.unwrap();
        assert_eq!(msg, Bytes::from_static(b"hello"));
    }
}
