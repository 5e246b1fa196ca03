//! Error types for the execution engine.

use motion_store::StoreError;

/// Error type for [`crate::instance::ComponentInstance`] operations.
///
/// Mirrors the categorization `hitbox_backend::BackendError` uses: backend
/// failures are wrapped transparently rather than flattened into a single
/// string, so callers can match on the underlying cause.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    /// A flow key was used that was never registered on the component.
    #[error("unknown flow {0:?}")]
    UnknownFlow(smol_str::SmolStr),

    /// A user-supplied serve or update function returned an error or
    /// panicked.
    #[error("user code error: {0}")]
    UserCode(Box<dyn std::error::Error + Send + Sync>),

    /// The underlying state store could not be reached.
    #[error(transparent)]
    BackendUnavailable(#[from] StoreError),

    /// The distributed lock guarding state writes could not be acquired
    /// within the configured timeout.
    #[error("lock contention on {name:?}")]
    LockContention {
        /// Name of the contended lock.
        name: String,
    },

    /// The instance was constructed with `disable_update_task`, so no
    /// update queue exists for the flow the caller tried to enqueue to.
    #[error("update task is disabled for this instance")]
    DisabledUpdateTask,

    /// An update queue's high-water mark was reached; the job was
    /// rejected rather than blocking the caller.
    #[error("update queue for flow {flow_key:?} is full")]
    Backpressure {
        /// The flow key whose queue was full.
        flow_key: smol_str::SmolStr,
    },

    /// The caller-specified deadline elapsed while awaiting a suspension
    /// point.
    #[error("operation timed out")]
    Timeout,

    /// The instance has been shut down and no longer accepts calls.
    #[error("instance is shutting down or already closed")]
    Shutdown,

    /// `Component::instance` was called with an invalid combination of
    /// options.
    #[error("invalid instance configuration: {0}")]
    InvalidConfig(String),

    /// Requested `WorkerMode::Process`, which this crate does not
    /// implement.
    #[error("process-mode update workers are not supported")]
    Unsupported,
}

impl From<motion_core::CanonicalizeError> for MotionError {
    fn from(error: motion_core::CanonicalizeError) -> Self {
        MotionError::UserCode(Box::new(error))
    }
}
