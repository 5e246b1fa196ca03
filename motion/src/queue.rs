//! Per-flow FIFO update queues.

use std::collections::HashMap;
use std::sync::Mutex;

use motion_core::FlowKey;
use tokio::sync::{mpsc, oneshot};

use crate::error::MotionError;

/// One job destined for a flow's update worker: the request's props and the
/// serve result it was computed against.
pub struct UpdateJob<Props, Res> {
    /// The props the originating request was called with.
    pub props: Props,
    /// The serve result computed for that request.
    pub result: Res,
}

/// An item traveling through a flow's update queue.
///
/// The flush barrier travels through the same ordered channel as jobs
/// rather than a side channel, so it is only ever observed after every job
/// enqueued ahead of it.
pub enum QueueMessage<Props, Res> {
    /// A unit of update work.
    Job(UpdateJob<Props, Res>),
    /// A request to signal `()` once every prior message has been applied.
    Flush(oneshot::Sender<()>),
}

struct FlowQueue<Props, Res> {
    sender: mpsc::Sender<QueueMessage<Props, Res>>,
}

/// Owns one bounded FIFO channel per update-bearing flow key.
pub struct UpdateQueueSet<Props, Res> {
    queues: Mutex<HashMap<FlowKey, FlowQueue<Props, Res>>>,
    capacity: usize,
}

impl<Props: Send + 'static, Res: Send + 'static> UpdateQueueSet<Props, Res> {
    /// Creates an empty queue set. Queues are created lazily, one per flow
    /// key, the first time [`Self::register_flow`] is called for that key.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Registers a flow key, returning the receiving half of its channel.
    ///
    /// Called once per flow at instance construction time, before any
    /// `enqueue` call for that flow — the worker pool owns the receiver.
    pub fn register_flow(&self, flow_key: FlowKey) -> mpsc::Receiver<QueueMessage<Props, Res>> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.queues
            .lock()
            .expect("update queue set lock poisoned")
            .insert(flow_key, FlowQueue { sender });
        receiver
    }

    /// Enqueues a job for `flow_key`. Never blocks: a full queue is reported
    /// immediately as [`MotionError::Backpressure`], matching the spec's
    /// "`enqueue` is declared non-blocking".
    pub fn enqueue(&self, flow_key: &FlowKey, job: UpdateJob<Props, Res>) -> Result<(), MotionError> {
        let sender = self.sender_for(flow_key)?;
        match sender.try_send(QueueMessage::Job(job)) {
            Ok(()) => {
                crate::metrics::record_enqueue(flow_key.as_str());
                Ok(())
            }
            Err(_) => {
                crate::metrics::record_reject(flow_key.as_str());
                Err(MotionError::Backpressure {
                    flow_key: flow_key.clone(),
                })
            }
        }
    }

    /// Enqueues a flush barrier for `flow_key` and awaits its completion.
    ///
    /// Completion means every job enqueued before this call for that flow
    /// has been applied to the state store.
    pub async fn flush(&self, flow_key: &FlowKey) -> Result<(), MotionError> {
        let sender = self.sender_for(flow_key)?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(QueueMessage::Flush(tx))
            .await
            .map_err(|_| MotionError::Backpressure {
                flow_key: flow_key.clone(),
            })?;
        rx.await.map_err(|_| MotionError::Shutdown)
    }

    /// Closes every flow's queue, letting already-queued jobs drain (if a
    /// worker is still consuming) but refusing new enqueues.
    pub fn close_all(&self) {
        self.queues
            .lock()
            .expect("update queue set lock poisoned")
            .clear();
    }

    fn sender_for(&self, flow_key: &FlowKey) -> Result<mpsc::Sender<QueueMessage<Props, Res>>, MotionError> {
        self.queues
            .lock()
            .expect("update queue set lock poisoned")
            .get(flow_key)
            .map(|q| q.sender.clone())
            .ok_or_else(|| MotionError::UnknownFlow(flow_key.clone()))
    }
}
