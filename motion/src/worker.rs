//! Update worker pool: one task per flow key draining its queue in batches.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use motion_core::{FlowKey, StateMap};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, warn};

use crate::cache::ResultCache;
use crate::config::WorkerMode;
use crate::error::MotionError;
use crate::queue::{QueueMessage, UpdateJob};
use crate::state::{StateSnapshot, VersionedState};

/// A batch update function: given the locked, freshly-reloaded state view
/// and the accumulated props and serve results for a batch, returns the
/// partial state to merge in.
///
/// Always batch-shaped, even for `batch_size == 1` registrations — a
/// `batch_size == 1` registration is sugar over this same signature, zipping
/// a single-item closure across length-1 vectors at registration time. The
/// state view is exactly the snapshot the worker reloaded under the state
/// lock immediately before calling this function, per spec. §4.5.
pub type UpdateFn<Props, Res> =
    Arc<dyn Fn(&StateSnapshot, Vec<Props>, Vec<Res>) -> StateMap + Send + Sync>;

#[derive(Debug)]
struct PanicError(String);

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update function panicked: {}", self.0)
    }
}

impl std::error::Error for PanicError {}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Owns the spawned tasks that drain each flow's update queue.
pub struct UpdateWorkerPool<Props, Res> {
    handles: Mutex<HashMap<FlowKey, JoinHandle<()>>>,
    _marker: std::marker::PhantomData<fn(Props, Res)>,
}

impl<Props, Res> UpdateWorkerPool<Props, Res>
where
    Props: Send + 'static,
    Res: Send + 'static,
{
    /// Creates an empty worker pool.
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            _marker: std::marker::PhantomData,
        }
    }

    /// Spawns the worker task for `flow_key`.
    ///
    /// `mode` is asserted to be [`WorkerMode::Thread`] by
    /// [`crate::config::InstanceOptions::validate`] before an instance is
    /// ever constructed, so this never has to decide between modes at
    /// runtime.
    pub fn spawn_worker(
        &self,
        flow_key: FlowKey,
        batch_size: usize,
        update_fn: UpdateFn<Props, Res>,
        mut receiver: mpsc::Receiver<QueueMessage<Props, Res>>,
        state: Arc<VersionedState>,
        cache: Arc<ResultCache<Res>>,
        mode: WorkerMode,
    ) where
        Res: Clone,
    {
        debug_assert_eq!(mode, WorkerMode::Thread, "Process mode is rejected at config validation time");
        let batch_size = batch_size.max(1);
        let span = info_span!("update_worker", flow = %flow_key);
        let worker_flow_key = flow_key.clone();

        let handle = tokio::spawn(
            async move {
                loop {
                    let Some(first) = receiver.recv().await else {
                        break;
                    };
                    match first {
                        QueueMessage::Flush(tx) => {
                            let _ = tx.send(());
                        }
                        QueueMessage::Job(job) => {
                            let mut jobs = vec![job];
                            let mut pending_flushes: Vec<oneshot::Sender<()>> = Vec::new();
                            while jobs.len() < batch_size {
                                match receiver.try_recv() {
                                    Ok(QueueMessage::Job(job)) => jobs.push(job),
                                    Ok(QueueMessage::Flush(tx)) => pending_flushes.push(tx),
                                    Err(_) => break,
                                }
                            }

                            let mut props = Vec::with_capacity(jobs.len());
                            let mut results = Vec::with_capacity(jobs.len());
                            for UpdateJob { props: p, result } in jobs {
                                props.push(p);
                                results.push(result);
                            }

                            match state.begin_update().await {
                                Ok((token, snapshot)) => {
                                    match run_batch(Arc::clone(&update_fn), Arc::clone(&snapshot), props, results).await {
                                        Ok(partial) => match state.commit_update(token, &snapshot, partial).await {
                                            Ok(_) => {
                                                crate::metrics::record_batch_applied(worker_flow_key.as_str());
                                                cache.invalidate_flow(&worker_flow_key);
                                            }
                                            Err(error) => {
                                                warn!(flow = %worker_flow_key, %error, "failed to persist update batch")
                                            }
                                        },
                                        Err(error) => {
                                            state.abort_update(token).await;
                                            warn!(flow = %worker_flow_key, %error, "update batch abandoned")
                                        }
                                    }
                                }
                                Err(error) => {
                                    warn!(flow = %worker_flow_key, %error, "failed to acquire state lock for update batch")
                                }
                            }

                            for tx in pending_flushes {
                                let _ = tx.send(());
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        self.handles
            .lock()
            .expect("update worker pool lock poisoned")
            .insert(flow_key, handle);
    }

    /// Aborts every worker task immediately, abandoning anything mid-batch.
    pub fn abort_all(&self) {
        for (_, handle) in self.handles.lock().expect("update worker pool lock poisoned").drain() {
            handle.abort();
        }
    }
}

impl<Props, Res> Default for UpdateWorkerPool<Props, Res>
where
    Props: Send + 'static,
    Res: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

async fn run_batch<Props, Res>(
    update_fn: UpdateFn<Props, Res>,
    snapshot: Arc<StateSnapshot>,
    props: Vec<Props>,
    results: Vec<Res>,
) -> Result<StateMap, MotionError>
where
    Props: Send + 'static,
    Res: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| update_fn(&snapshot, props, results)))
    });
    match handle.await {
        Ok(Ok(partial)) => Ok(partial),
        Ok(Err(payload)) => Err(MotionError::UserCode(Box::new(PanicError(panic_message(payload))))),
        Err(join_error) => Err(MotionError::UserCode(Box::new(join_error))),
    }
}
