//! Serve route shapes and the dispatch algorithm.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use motion_core::state::Version;
use motion_core::{CacheEntryKey, FlowKey, Fingerprint};
use tracing::{debug, instrument, trace};

use crate::cache::ResultCache;
use crate::config::InstanceOptions;
use crate::error::MotionError;
use crate::queue::{UpdateQueueSet, UpdateJob};
use crate::state::{StateSnapshot, VersionedState};
use crate::worker::UpdateFn;

/// The four serve shapes a flow can be registered with.
///
/// One-to-one with the reference implementation's `run`/`gen`/`arun`/`agen`
/// surface: a `Value` route answers [`Dispatcher::run`], a `Sequence` route
/// answers [`Dispatcher::gen`], and so on for the async pair.
pub enum ServeRoute<Props, Res> {
    /// A synchronous handler returning a single value.
    Value(Arc<dyn Fn(&StateSnapshot, &Props) -> Res + Send + Sync>),
    /// A synchronous handler returning a sequence of values.
    Sequence(Arc<dyn Fn(&StateSnapshot, &Props) -> Box<dyn Iterator<Item = Res> + Send> + Send + Sync>),
    /// An asynchronous handler returning a single value.
    AsyncValue(Arc<dyn Fn(Arc<StateSnapshot>, Props) -> BoxFuture<'static, Res> + Send + Sync>),
    /// An asynchronous handler returning a stream of values.
    AsyncSequence(Arc<dyn Fn(Arc<StateSnapshot>, Props) -> BoxStream<'static, Res> + Send + Sync>),
}

/// The update handler registered for a flow key.
pub struct UpdateRoute<Props, Res> {
    /// How many jobs accumulate before a batch is applied.
    pub batch_size: usize,
    /// The batch update function.
    pub func: UpdateFn<Props, Res>,
}

/// Per-call dispatch options, resolving spec's "unresolved ambiguity"
/// between `force_refresh` and `ignore_cache`: `force_refresh` drains the
/// flow's update queue then reloads state before serving; `ignore_cache`
/// skips both the cache read and the cache write for this call, without
/// touching the queue or state freshness.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// Drain pending updates for this flow and reload state before serving.
    pub force_refresh: bool,
    /// Skip both reading and writing the result cache for this call.
    pub ignore_cache: bool,
    /// Await the flow's update queue to fully drain before returning.
    pub flush_after: bool,
    /// Bounds every suspension point in this call; expiry surfaces as
    /// [`MotionError::Timeout`] without cancelling any update job that was
    /// already enqueued.
    pub deadline: Option<Duration>,
}

/// Executes dispatch for one component instance: validates the flow, applies
/// freshness/caching policy, runs the serve route, and enqueues update jobs.
pub struct Dispatcher<Props, Res> {
    state: Arc<VersionedState>,
    cache: Arc<ResultCache<Res>>,
    /// Materialized-sequence cache for `gen()`'s synchronous `Sequence`
    /// route: the one streaming shape that is eagerly collected and thus
    /// finite and bounded per spec §4.6 step 5, so it gets its own
    /// `(flow_key, version, fingerprint) -> Vec<Res>` cache rather than
    /// sharing `cache`'s single-`Res` entries.
    seq_cache: Arc<ResultCache<Vec<Res>>>,
    queue: Arc<UpdateQueueSet<Props, Res>>,
    serves: HashMap<FlowKey, ServeRoute<Props, Res>>,
    updates: HashMap<FlowKey, UpdateRoute<Props, Res>>,
    options: InstanceOptions,
}

impl<Props, Res> Dispatcher<Props, Res>
where
    Props: serde::Serialize + Clone + Send + Sync + 'static,
    Res: Clone + Send + Sync + 'static,
{
    /// Builds a dispatcher from its registered routes and shared components.
    pub fn new(
        state: Arc<VersionedState>,
        cache: Arc<ResultCache<Res>>,
        queue: Arc<UpdateQueueSet<Props, Res>>,
        serves: HashMap<FlowKey, ServeRoute<Props, Res>>,
        updates: HashMap<FlowKey, UpdateRoute<Props, Res>>,
        options: InstanceOptions,
    ) -> Self {
        Self {
            state,
            cache,
            seq_cache: Arc::new(ResultCache::new()),
            queue,
            serves,
            updates,
            options,
        }
    }

    /// Serves `flow_key` registered as [`ServeRoute::Value`] or
    /// [`ServeRoute::AsyncValue`]. For a `Sequence`/`AsyncSequence` route,
    /// returns the first produced element.
    #[instrument(skip(self, props, opts), fields(flow = %flow_key))]
    pub async fn run(
        &self,
        flow_key: &str,
        props: Props,
        opts: DispatchOptions,
    ) -> Result<Res, MotionError> {
        self.within_deadline(opts.deadline, self.dispatch_value(flow_key, props, opts)).await
    }

    /// Serves `flow_key` registered as [`ServeRoute::Sequence`] or
    /// [`ServeRoute::AsyncSequence`], returning the full sequence.
    ///
    /// Streaming results bypass the result cache entirely — only the
    /// single-value path participates in caching.
    #[instrument(skip(self, props, opts), fields(flow = %flow_key))]
    pub async fn gen(
        &self,
        flow_key: &str,
        props: Props,
        opts: DispatchOptions,
    ) -> Result<BoxStream<'static, Res>, MotionError> {
        self.within_deadline(opts.deadline, self.dispatch_sequence(flow_key, props, opts)).await
    }

    async fn within_deadline<T>(
        &self,
        deadline: Option<Duration>,
        fut: impl std::future::Future<Output = Result<T, MotionError>>,
    ) -> Result<T, MotionError> {
        match deadline {
            Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| MotionError::Timeout)?,
            None => fut.await,
        }
    }

    async fn dispatch_value(
        &self,
        flow_key: &str,
        props: Props,
        opts: DispatchOptions,
    ) -> Result<Res, MotionError> {
        let route = self
            .serves
            .get(flow_key)
            .ok_or_else(|| MotionError::UnknownFlow(flow_key.into()))?;

        let snapshot = self.freshen(flow_key, opts.force_refresh).await?;
        let fingerprint = self.fingerprint(flow_key, &props);

        if !opts.ignore_cache
            && let Some(fp) = fingerprint
            && let Some(cached) = self.cache.get(&CacheEntryKey::new(flow_key.into(), snapshot.version, fp))
        {
            trace!("result cache hit");
            crate::metrics::record_dispatch(flow_key, true);
            self.maybe_enqueue_update(flow_key, props, cached.clone())?;
            self.maybe_flush_after(flow_key, opts.flush_after).await?;
            return Ok(cached);
        }
        crate::metrics::record_dispatch(flow_key, false);

        let value = match route {
            ServeRoute::Value(handler) => handler(&snapshot, &props),
            ServeRoute::AsyncValue(handler) => handler(Arc::clone(&snapshot), props.clone()).await,
            ServeRoute::Sequence(handler) => handler(&snapshot, &props)
                .next()
                .ok_or_else(|| MotionError::UserCode(Box::new(EmptySequence)))?,
            ServeRoute::AsyncSequence(handler) => {
                use futures::StreamExt;
                handler(Arc::clone(&snapshot), props.clone())
                    .next()
                    .await
                    .ok_or_else(|| MotionError::UserCode(Box::new(EmptySequence)))?
            }
        };

        if !opts.ignore_cache && let Some(fp) = fingerprint {
            self.cache.insert(
                CacheEntryKey::new(flow_key.into(), snapshot.version, fp),
                value.clone(),
                self.options.cache_ttl,
            );
        }

        self.maybe_enqueue_update(flow_key, props, value.clone())?;
        self.maybe_flush_after(flow_key, opts.flush_after).await?;
        Ok(value)
    }

    async fn dispatch_sequence(
        &self,
        flow_key: &str,
        props: Props,
        opts: DispatchOptions,
    ) -> Result<BoxStream<'static, Res>, MotionError> {
        use futures::StreamExt;

        let route = self
            .serves
            .get(flow_key)
            .ok_or_else(|| MotionError::UnknownFlow(flow_key.into()))?;
        let snapshot = self.freshen(flow_key, opts.force_refresh).await?;
        let fingerprint = self.fingerprint(flow_key, &props);

        // Only `Sequence` is eagerly materialized into a `Vec<Res>` and thus
        // finite and bounded per spec §4.6 step 5 — `AsyncSequence` may be an
        // unbounded generator, so it is never cached and served lazily below.
        if matches!(route, ServeRoute::Sequence(_)) && !opts.ignore_cache
            && let Some(fp) = fingerprint
            && let Some(items) = self.seq_cache.get(&CacheEntryKey::new(flow_key.into(), snapshot.version, fp))
        {
            trace!("sequence cache hit");
            crate::metrics::record_dispatch(flow_key, true);
            if let Some(result) = items.first().cloned() {
                self.maybe_enqueue_update(flow_key, props, result)?;
            }
            self.maybe_flush_after(flow_key, opts.flush_after).await?;
            return Ok(futures::stream::iter(items).boxed());
        }
        if matches!(route, ServeRoute::Sequence(_)) {
            crate::metrics::record_dispatch(flow_key, false);
        }

        let stream: BoxStream<'static, Res> = match route {
            ServeRoute::Sequence(handler) => {
                let items: Vec<Res> = handler(&snapshot, &props).collect();
                if !opts.ignore_cache && let Some(fp) = fingerprint {
                    self.seq_cache.insert(
                        CacheEntryKey::new(flow_key.into(), snapshot.version, fp),
                        items.clone(),
                        self.options.cache_ttl,
                    );
                }
                if let Some(result) = items.first().cloned() {
                    self.maybe_enqueue_update(flow_key, props, result)?;
                }
                futures::stream::iter(items).boxed()
            }
            // Lazily served, never materialized — may be unbounded, so it
            // cannot be cached or turned into a single update-job result
            // without consuming it; register a `Value`/`AsyncValue` route
            // under the same flow key if its update function needs the
            // served result.
            ServeRoute::AsyncSequence(handler) => handler(Arc::clone(&snapshot), props.clone()),
            ServeRoute::Value(handler) => {
                let value = handler(&snapshot, &props);
                self.maybe_enqueue_update(flow_key, props, value.clone())?;
                futures::stream::iter(vec![value]).boxed()
            }
            ServeRoute::AsyncValue(handler) => {
                let value = handler(Arc::clone(&snapshot), props.clone()).await;
                self.maybe_enqueue_update(flow_key, props, value.clone())?;
                futures::stream::iter(vec![value]).boxed()
            }
        };

        self.maybe_flush_after(flow_key, opts.flush_after).await?;
        Ok(stream)
    }

    async fn freshen(&self, flow_key: &str, force_refresh: bool) -> Result<Arc<StateSnapshot>, MotionError> {
        if force_refresh {
            if !self.options.disable_update_task {
                self.queue.flush(&FlowKey::new(flow_key)).await.ok();
            }
            self.state.load(true).await
        } else {
            self.state.load(false).await
        }
    }

    fn fingerprint(&self, flow_key: &str, props: &Props) -> Option<Fingerprint> {
        match Fingerprint::compute(flow_key, props) {
            Ok(fp) => Some(fp),
            Err(error) => {
                debug!(%error, "props not serializable, bypassing cache for this call");
                None
            }
        }
    }

    fn maybe_enqueue_update(&self, flow_key: &str, props: Props, result: Res) -> Result<(), MotionError> {
        if self.options.disable_update_task || !self.updates.contains_key(flow_key) {
            return Ok(());
        }
        let key = FlowKey::new(flow_key);
        self.queue.enqueue(&key, UpdateJob { props, result })
    }

    async fn maybe_flush_after(&self, flow_key: &str, flush_after: bool) -> Result<(), MotionError> {
        if flush_after && !self.options.disable_update_task {
            self.queue.flush(&FlowKey::new(flow_key)).await?;
        }
        Ok(())
    }

    /// Current state version, without forcing a reload.
    pub async fn version(&self) -> Result<Version, MotionError> {
        Ok(self.state.load(false).await?.version)
    }

    /// The shared state container, exposed for `read_state`/`write_state`.
    pub fn state(&self) -> &Arc<VersionedState> {
        &self.state
    }

    /// The shared update queue set, exposed for explicit `flush_update`.
    pub fn queue(&self) -> &Arc<UpdateQueueSet<Props, Res>> {
        &self.queue
    }

    /// Whether `flow_key` is a registered serve route.
    pub fn has_flow(&self, flow_key: &str) -> bool {
        self.serves.contains_key(flow_key)
    }

    /// Every flow key with a registered update route, i.e. every flow that
    /// owns a queue worth draining on shutdown.
    pub fn update_flow_keys(&self) -> Vec<FlowKey> {
        self.updates.keys().cloned().collect()
    }
}

#[derive(Debug)]
struct EmptySequence;

impl std::fmt::Display for EmptySequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("serve sequence produced no elements")
    }
}

impl std::error::Error for EmptySequence {}
