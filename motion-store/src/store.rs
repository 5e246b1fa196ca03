//! The [`StateStore`] trait: a thin boundary over an external key/value
//! service supporting GET/SET, integer INCR, atomic lock acquisition with
//! TTL, and pub/sub.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// Result type for [`StateStore`] operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque proof of lock ownership, required to release the lock you took.
///
/// Tokens are backend-specific (a Redis store embeds a random value it
/// compares-and-deletes via script; the in-memory store embeds a generation
/// counter) and are never inspected by callers.
#[derive(Clone, PartialEq, Eq)]
pub struct LockToken(pub(crate) Box<[u8]>);

impl LockToken {
    /// Wraps raw bytes as a lock token.
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// The raw bytes of this token.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({} bytes)", self.0.len())
    }
}

/// A boundary over an external key/value store, mutual-exclusion lock, and
/// pub/sub channel.
///
/// Dyn-compatible so a [`ComponentInstance`](https://docs.rs/motion) can hold
/// an `Arc<dyn StateStore>` without committing to a concrete backend at
/// compile time — mirroring how `hitbox_backend::Backend` lets cache layers
/// be swapped without generic parameters leaking into call sites.
///
/// Implementations never retry internally: any timeout surfaces as
/// [`StoreError::BackendUnavailable`], and retry policy is left to the
/// engine.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the raw bytes stored under `key`, or `None` on miss.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Writes `value` under `key`, optionally with an expiry.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StoreResult<()>;

    /// Atomically increments the integer stored under `key`, creating it
    /// (starting from 0) if absent, and returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Attempts to acquire a named mutual-exclusion lock, bounding orphan
    /// locks to `ttl` so a crashed holder cannot wedge the lock forever.
    ///
    /// Returns a [`LockToken`] that must be presented to [`Self::unlock`].
    /// Implementations should fail fast (return
    /// [`StoreError::LockContention`]) rather than block — callers that want
    /// to retry are expected to implement their own backoff loop around this
    /// call, exactly as the engine's `VersionedState::apply_update` does.
    async fn lock(&self, name: &str, ttl: Duration) -> StoreResult<LockToken>;

    /// Releases a lock previously acquired with [`Self::lock`].
    ///
    /// Implementations should verify `token` still matches the current
    /// holder before releasing (so a lock that already expired and was
    /// re-acquired by someone else is not stolen out from under them), and
    /// treat a mismatch as a silent no-op rather than an error.
    async fn unlock(&self, name: &str, token: LockToken) -> StoreResult<()>;

    /// Publishes `msg` on `channel`.
    async fn publish(&self, channel: &str, msg: Bytes) -> StoreResult<()>;

    /// Subscribes to `channel`, returning a stream of future messages.
    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, Bytes>>;
}

#[async_trait]
impl StateStore for Arc<dyn StateStore> {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StoreResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        (**self).incr(key).await
    }

    async fn lock(&self, name: &str, ttl: Duration) -> StoreResult<LockToken> {
        (**self).lock(name, ttl).await
    }

    async fn unlock(&self, name: &str, token: LockToken) -> StoreResult<()> {
        (**self).unlock(name, token).await
    }

    async fn publish(&self, channel: &str, msg: Bytes) -> StoreResult<()> {
        (**self).publish(channel, msg).await
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, Bytes>> {
        (**self).subscribe(channel).await
    }
}
