//! Versioned state container.
//!
//! Holds the authoritative in-memory view of an instance's state dictionary,
//! backed by a [`StateStore`] for durability and cross-process visibility.
//! Reads go against an immutable snapshot swapped in under a `RwLock`,
//! matching the "lock-free reads, fine-grained writes" texture
//! `hitbox::concurrency::BroadcastConcurrencyManager` gets from `DashMap`'s
//! entry API — here realized with `std::sync::RwLock<Arc<StateSnapshot>>`
//! since only the snapshot pointer itself, not a whole map, is swapped.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use motion_core::state::{StateMap, Version, merge_state};
use motion_core::InstanceName;
use motion_store::{StateCodec, StateStore};
use tracing::{debug, trace, warn};

use crate::error::MotionError;

/// An immutable point-in-time view of an instance's state.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// The version this snapshot was read at.
    pub version: Version,
    /// The state dictionary at that version.
    pub state: StateMap,
}

/// The versioned, store-backed state container for one component instance.
pub struct VersionedState {
    instance: InstanceName,
    store: Arc<dyn StateStore>,
    codec: Arc<dyn StateCodec>,
    snapshot: RwLock<Arc<StateSnapshot>>,
    lock_ttl: Duration,
    lock_timeout: Duration,
}

impl VersionedState {
    /// Creates a container with an empty, version-0 snapshot. Call
    /// [`Self::initialize`] or [`Self::load`] to populate it from the store.
    pub fn new(
        instance: InstanceName,
        store: Arc<dyn StateStore>,
        codec: Arc<dyn StateCodec>,
        lock_ttl: Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            instance,
            store,
            codec,
            snapshot: RwLock::new(Arc::new(StateSnapshot {
                version: 0,
                state: StateMap::new(),
            })),
            lock_ttl,
            lock_timeout,
        }
    }

    /// Returns the currently cached snapshot without touching the store.
    pub fn current(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.snapshot.read().expect("state snapshot lock poisoned"))
    }

    /// Reads a single key out of the current snapshot, falling back to
    /// `default` on miss.
    pub fn read_key(&self, key: &str, default: Option<motion_core::state::StateValue>) -> Option<motion_core::state::StateValue> {
        let snapshot = self.current();
        snapshot.state.get(key).cloned().or(default)
    }

    /// Loads state and version from the store.
    ///
    /// If `force` is `false` and a snapshot is already cached, the cached
    /// snapshot is returned without a round trip. If `force` is `true`, the
    /// store is always consulted and the cached snapshot refreshed.
    pub async fn load(&self, force: bool) -> Result<Arc<StateSnapshot>, MotionError> {
        if !force {
            let cached = self.current();
            if cached.version > 0 || !cached.state.is_empty() {
                return Ok(cached);
            }
        }
        self.reload_from_store().await
    }

    /// Writes `initial` as version 1, matching the reference implementation
    /// where construction itself counts as the first version bump.
    ///
    /// No-op (returns the existing snapshot) if the store already has a
    /// persisted version for this instance. Guarded by the same state lock
    /// `apply_update`/`begin_update` use, so that of any number of instances
    /// sharing `instance_name` that race to construct, exactly one of them
    /// runs the initializer — per spec. §4.2, "runs the user's state
    /// initializer exactly once across all instances sharing this name
    /// (guarded by the same lock)".
    pub async fn initialize(&self, initial: StateMap) -> Result<Arc<StateSnapshot>, MotionError> {
        let existing = self.store.get(&self.instance.version_key()).await?;
        if existing.is_some() {
            debug!(instance = %self.instance, "instance already initialized, skipping");
            return self.reload_from_store().await;
        }

        let lock_name = self.instance.state_lock_name();
        let token = self.acquire_lock(&lock_name).await?;

        let result = async {
            // Re-check under the lock: another instance may have raced us
            // between the unguarded check above and acquiring the lock.
            if self.store.get(&self.instance.version_key()).await?.is_some() {
                debug!(instance = %self.instance, "instance initialized concurrently, skipping");
                return self.reload_from_store().await;
            }
            let encoded = self
                .codec
                .encode(&initial)
                .map_err(|e| MotionError::UserCode(Box::new(e)))?;
            self.store.set(&self.instance.state_key(), encoded, None).await?;
            let version = self.store.incr(&self.instance.version_key()).await?;
            let snapshot = Arc::new(StateSnapshot {
                version: version as Version,
                state: initial,
            });
            *self.snapshot.write().expect("state snapshot lock poisoned") = Arc::clone(&snapshot);
            Ok(snapshot)
        }
        .await;

        if let Err(error) = self.store.unlock(&lock_name, token).await {
            warn!(instance = %self.instance, %error, "failed to release state lock after initialize");
        }
        result
    }

    /// Applies a partial update: acquires the distributed lock, reloads the
    /// latest state, shallow-merges `partial` in, persists, and bumps the
    /// version — in that order, matching the spec's
    /// lock → reload → merge → persist → bump-version sequence.
    ///
    /// Used by [`crate::instance::ComponentInstance::write_state`] for
    /// out-of-band edits where the caller already computed `partial` against
    /// a state view it read itself. The update worker pool uses the
    /// lower-level [`Self::begin_update`]/[`Self::commit_update`]/
    /// [`Self::abort_update`] split instead, since it needs to hand the
    /// user's update function the locked, reloaded state view *before*
    /// `partial` exists.
    pub async fn apply_update(&self, partial: StateMap) -> Result<Arc<StateSnapshot>, MotionError> {
        let lock_name = self.instance.state_lock_name();
        let token = self.acquire_lock(&lock_name).await?;

        let result = async {
            let latest = self.reload_from_store().await?;
            let mut merged = latest.state.clone();
            merge_state(&mut merged, partial);
            let encoded = self
                .codec
                .encode(&merged)
                .map_err(|e| MotionError::UserCode(Box::new(e)))?;
            self.store.set(&self.instance.state_key(), encoded, None).await?;
            let version = self.store.incr(&self.instance.version_key()).await?;
            let snapshot = Arc::new(StateSnapshot {
                version: version as Version,
                state: merged,
            });
            *self.snapshot.write().expect("state snapshot lock poisoned") = Arc::clone(&snapshot);
            Ok(snapshot)
        }
        .await;

        if let Err(error) = self.store.unlock(&lock_name, token).await {
            warn!(instance = %self.instance, %error, "failed to release state lock");
        }
        result
    }

    /// Acquires the update lock and reloads state to the latest persisted
    /// version, returning both the lock token and the snapshot the caller's
    /// update function should see — matching spec. §4.5's "acquire the
    /// state lock; reload state to the latest persisted version" before the
    /// user's update function runs.
    ///
    /// On success, the caller must eventually call exactly one of
    /// [`Self::commit_update`] or [`Self::abort_update`] with the returned
    /// token to release the lock.
    pub(crate) async fn begin_update(&self) -> Result<(motion_store::LockToken, Arc<StateSnapshot>), MotionError> {
        let lock_name = self.instance.state_lock_name();
        let token = self.acquire_lock(&lock_name).await?;
        match self.reload_from_store().await {
            Ok(snapshot) => Ok((token, snapshot)),
            Err(error) => {
                if let Err(unlock_error) = self.store.unlock(&lock_name, token).await {
                    warn!(instance = %self.instance, %unlock_error, "failed to release state lock after failed reload");
                }
                Err(error)
            }
        }
    }

    /// Merges `partial` (computed by the caller's update function against
    /// `base`) into `base`, persists, bumps the version, and releases
    /// `token`. `base` must be the snapshot [`Self::begin_update`] returned
    /// alongside `token`.
    pub(crate) async fn commit_update(
        &self,
        token: motion_store::LockToken,
        base: &StateSnapshot,
        partial: StateMap,
    ) -> Result<Arc<StateSnapshot>, MotionError> {
        let lock_name = self.instance.state_lock_name();
        let result = async {
            let mut merged = base.state.clone();
            merge_state(&mut merged, partial);
            let encoded = self
                .codec
                .encode(&merged)
                .map_err(|e| MotionError::UserCode(Box::new(e)))?;
            self.store.set(&self.instance.state_key(), encoded, None).await?;
            let version = self.store.incr(&self.instance.version_key()).await?;
            let snapshot = Arc::new(StateSnapshot {
                version: version as Version,
                state: merged,
            });
            *self.snapshot.write().expect("state snapshot lock poisoned") = Arc::clone(&snapshot);
            Ok(snapshot)
        }
        .await;

        if let Err(error) = self.store.unlock(&lock_name, token).await {
            warn!(instance = %self.instance, %error, "failed to release state lock");
        }
        result
    }

    /// Releases `token` without committing any change, e.g. because the
    /// caller's update function failed or panicked.
    pub(crate) async fn abort_update(&self, token: motion_store::LockToken) {
        let lock_name = self.instance.state_lock_name();
        if let Err(error) = self.store.unlock(&lock_name, token).await {
            warn!(instance = %self.instance, %error, "failed to release state lock after aborted update");
        }
    }

    async fn reload_from_store(&self) -> Result<Arc<StateSnapshot>, MotionError> {
        let raw = self.store.get(&self.instance.state_key()).await?;
        let state = match raw {
            Some(bytes) => self
                .codec
                .decode(&bytes)
                .map_err(|e| MotionError::UserCode(Box::new(e)))?,
            None => StateMap::new(),
        };
        let version = self.store.get(&self.instance.version_key()).await?;
        let version = version
            .and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse::<Version>().ok())
            .unwrap_or(0);
        let snapshot = Arc::new(StateSnapshot { version, state });
        *self.snapshot.write().expect("state snapshot lock poisoned") = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    async fn acquire_lock(&self, name: &str) -> Result<motion_store::LockToken, MotionError> {
        let mut backoff = Duration::from_millis(10);
        let deadline = tokio::time::Instant::now() + self.lock_timeout;
        loop {
            match self.store.lock(name, self.lock_ttl).await {
                Ok(token) => return Ok(token),
                Err(motion_store::StoreError::LockContention { .. }) => {
                    if tokio::time::Instant::now() >= deadline {
                        crate::metrics::record_lock_contention(name);
                        return Err(MotionError::LockContention {
                            name: name.to_string(),
                        });
                    }
                    trace!(lock = name, backoff_ms = backoff.as_millis(), "lock contended, backing off");
                    tokio::time::sleep(backoff.min(deadline - tokio::time::Instant::now())).await;
                    backoff = (backoff * 2).min(Duration::from_secs(1));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}
