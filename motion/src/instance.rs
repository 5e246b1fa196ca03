//! A running component instance: the dispatcher plus its background workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use motion_core::state::StateMap;
use motion_core::InstanceName;
use motion_store::{BincodeCodec, StateCodec, StateStore};
use tracing::warn;

use crate::config::InstanceOptions;
use crate::error::MotionError;
use crate::executor::{DispatchOptions, Dispatcher, ServeRoute, UpdateRoute};
use crate::cache::ResultCache;
use crate::queue::UpdateQueueSet;
use crate::state::VersionedState;
use crate::worker::UpdateWorkerPool;

/// Lifecycle stages a [`ComponentInstance`] moves through.
///
/// Each transition is one-way: `NEW -> INITIALIZING -> RUNNING -> DRAINING ->
/// CLOSED`. Realized as a `u8` under a single atomic so a transition is one
/// compare-and-swap rather than a lock.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, not yet initialized against the store.
    New = 0,
    /// `initialize`/`load` is in flight.
    Initializing = 1,
    /// Accepting `run`/`gen`/`arun`/`agen` calls.
    Running = 2,
    /// `shutdown` was called; queues are draining if `flush_on_exit` is set.
    Draining = 3,
    /// Fully shut down; every method returns [`MotionError::Shutdown`].
    Closed = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::New,
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Running,
            3 => Lifecycle::Draining,
            _ => Lifecycle::Closed,
        }
    }
}

struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    fn new() -> Self {
        Self(AtomicU8::new(Lifecycle::New as u8))
    }

    fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    fn advance_to(&self, next: Lifecycle) {
        self.0.store(next as u8, Ordering::Release);
    }
}

/// A single instance of a [`crate::component::Component`]: its own state,
/// result cache, update queues, and worker tasks.
pub struct ComponentInstance<Props, Res> {
    name: InstanceName,
    dispatcher: Dispatcher<Props, Res>,
    worker: Arc<UpdateWorkerPool<Props, Res>>,
    init_state: Arc<dyn Fn() -> StateMap + Send + Sync>,
    options: InstanceOptions,
    lifecycle: LifecycleCell,
}

impl<Props, Res> ComponentInstance<Props, Res>
where
    Props: serde::Serialize + Clone + Send + Sync + 'static,
    Res: Clone + Send + Sync + 'static,
{
    /// Constructs the instance's engine plumbing and spawns one worker task
    /// per registered update route. Does not touch the store — call
    /// [`Self::initialize`] or let the first [`Self::run`] call load lazily.
    pub(crate) fn build(
        name: InstanceName,
        store: Arc<dyn StateStore>,
        serves: HashMap<motion_core::FlowKey, ServeRoute<Props, Res>>,
        updates: HashMap<motion_core::FlowKey, UpdateRoute<Props, Res>>,
        init_state: Arc<dyn Fn() -> StateMap + Send + Sync>,
        options: InstanceOptions,
    ) -> Result<Self, MotionError> {
        options.validate()?;

        let codec: Arc<dyn StateCodec> = Arc::new(BincodeCodec);
        let state = Arc::new(VersionedState::new(
            name.clone(),
            Arc::clone(&store),
            codec,
            options.lock_ttl,
            options.redis_socket_timeout,
        ));
        let cache = Arc::new(ResultCache::new());
        let queue = Arc::new(UpdateQueueSet::new(options.queue_capacity));
        let worker = Arc::new(UpdateWorkerPool::new());

        if !options.disable_update_task {
            for (flow_key, route) in &updates {
                let receiver = queue.register_flow(flow_key.clone());
                worker.spawn_worker(
                    flow_key.clone(),
                    route.batch_size,
                    Arc::clone(&route.func),
                    receiver,
                    Arc::clone(&state),
                    Arc::clone(&cache),
                    options.update_task_type,
                );
            }
        }

        let dispatcher = Dispatcher::new(state, cache, queue, serves, updates, options.clone());

        Ok(Self {
            name,
            dispatcher,
            worker,
            init_state,
            options,
            lifecycle: LifecycleCell::new(),
        })
    }

    /// This instance's identity.
    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Loads existing state from the store, or persists `initial` as
    /// version 1 if the store has nothing for this instance yet.
    pub async fn initialize(&self, initial: StateMap) -> Result<(), MotionError> {
        self.lifecycle.advance_to(Lifecycle::Initializing);
        self.dispatcher.state().initialize(initial).await?;
        self.lifecycle.advance_to(Lifecycle::Running);
        Ok(())
    }

    /// Same as [`Self::initialize`], using the component's registered
    /// `init_state` closure to produce the initial state.
    pub async fn initialize_default(&self) -> Result<(), MotionError> {
        let initial = (self.init_state)();
        self.initialize(initial).await
    }

    /// Serves `flow_key`, see [`Dispatcher::run`].
    pub async fn run(&self, flow_key: &str, props: Props) -> Result<Res, MotionError> {
        self.run_with(flow_key, props, DispatchOptions::default()).await
    }

    /// Serves `flow_key` with explicit [`DispatchOptions`].
    pub async fn run_with(
        &self,
        flow_key: &str,
        props: Props,
        opts: DispatchOptions,
    ) -> Result<Res, MotionError> {
        self.ensure_running()?;
        self.dispatcher.run(flow_key, props, opts).await
    }

    /// Serves `flow_key` as a sequence, see [`Dispatcher::gen`].
    pub async fn gen(
        &self,
        flow_key: &str,
        props: Props,
    ) -> Result<futures::stream::BoxStream<'static, Res>, MotionError> {
        self.ensure_running()?;
        self.dispatcher.gen(flow_key, props, DispatchOptions::default()).await
    }

    /// Alias of [`Self::run`], matching the reference implementation's
    /// separate async entry point. Every operation on `ComponentInstance` is
    /// already asynchronous, so `arun` and `run` are the same call.
    pub async fn arun(&self, flow_key: &str, props: Props) -> Result<Res, MotionError> {
        self.run(flow_key, props).await
    }

    /// Alias of [`Self::gen`], see [`Self::arun`].
    pub async fn agen(
        &self,
        flow_key: &str,
        props: Props,
    ) -> Result<futures::stream::BoxStream<'static, Res>, MotionError> {
        self.gen(flow_key, props).await
    }

    /// Reads a single key out of the current state snapshot, lazily
    /// refreshing via `state.load(force=false)` first — a no-op round trip
    /// if the in-memory snapshot is already current, per spec. §4.6.
    pub async fn read_state(&self, key: &str) -> Result<Option<motion_core::state::StateValue>, MotionError> {
        self.ensure_running()?;
        let snapshot = self.dispatcher.state().load(false).await?;
        Ok(snapshot.state.get(key).cloned())
    }

    /// Applies a partial update directly, bypassing the update queue.
    pub async fn write_state(&self, partial: StateMap) -> Result<(), MotionError> {
        self.ensure_running()?;
        self.dispatcher.state().apply_update(partial).await?;
        Ok(())
    }

    /// The current state version.
    pub async fn get_version(&self) -> Result<motion_core::state::Version, MotionError> {
        self.dispatcher.version().await
    }

    /// Awaits every job enqueued for `flow_key` before this call to be
    /// applied.
    pub async fn flush_update(&self, flow_key: &str) -> Result<(), MotionError> {
        self.ensure_running()?;
        if self.options.disable_update_task {
            return Err(MotionError::DisabledUpdateTask);
        }
        self.dispatcher
            .queue()
            .flush(&motion_core::FlowKey::new(flow_key))
            .await
    }

    /// Idempotent shutdown: stops accepting new calls, optionally drains
    /// update queues if `flush_on_exit` was configured, then aborts any
    /// worker task still running.
    pub async fn shutdown(&self) {
        if self.lifecycle.get() == Lifecycle::Closed {
            return;
        }
        self.lifecycle.advance_to(Lifecycle::Draining);
        if self.options.flush_on_exit {
            for flow_key in self.dispatcher.update_flow_keys() {
                if let Err(error) = self.dispatcher.queue().flush(&flow_key).await {
                    warn!(%flow_key, %error, "failed to drain update queue during shutdown");
                }
            }
        }
        self.worker.abort_all();
        self.dispatcher.queue().close_all();
        self.lifecycle.advance_to(Lifecycle::Closed);
    }

    fn ensure_running(&self) -> Result<(), MotionError> {
        match self.lifecycle.get() {
            Lifecycle::Running => Ok(()),
            Lifecycle::New => Ok(()),
            _ => Err(MotionError::Shutdown),
        }
    }

    /// The current lifecycle stage.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }
}

impl<Props, Res> Drop for ComponentInstance<Props, Res> {
    fn drop(&mut self) {
        if self.lifecycle.get() != Lifecycle::Closed {
            warn!(
                instance = %self.name,
                "ComponentInstance dropped without calling shutdown(); aborting worker tasks, \
                 state lock will reclaim by TTL"
            );
            self.worker.abort_all();
        }
    }
}
