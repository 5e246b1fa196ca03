//! Instance configuration.

use std::time::Duration;

use crate::error::MotionError;

/// Where an update batch's user function runs.
///
/// Mirrors the Python reference's `update_task_type` split between a thread
/// and a process. Only [`WorkerMode::Thread`] is implemented: cross-process
/// execution would require marshaling a user closure across a process
/// boundary, for which Rust has no safe equivalent to Python's pickling
/// without inventing a plugin ABI, which is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Runs each update batch on a blocking OS thread via
    /// `tokio::task::spawn_blocking`, keeping the async runtime free while a
    /// CPU-bound update function executes.
    #[default]
    Thread,
    /// Not implemented. Selecting this mode fails
    /// [`crate::component::Component::instance`] with
    /// [`MotionError::Unsupported`].
    Process,
}

/// Per-instance configuration, unchanged in substance from the reference
/// implementation's constructor options.
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    /// Where update batches run. Defaults to [`WorkerMode::Thread`].
    pub update_task_type: WorkerMode,
    /// If `true`, no update queue or worker is created for this instance;
    /// enqueuing an update job fails with [`MotionError::DisabledUpdateTask`].
    pub disable_update_task: bool,
    /// If `true`, [`crate::instance::ComponentInstance::shutdown`] drains
    /// every update queue to completion before returning. If `false`,
    /// in-flight and queued jobs are abandoned.
    pub flush_on_exit: bool,
    /// Default TTL applied to result cache entries.
    pub cache_ttl: Duration,
    /// Timeout applied to state store round trips, and the cap on the
    /// distributed lock's exponential backoff retry loop.
    pub redis_socket_timeout: Duration,
    /// Suggested `tracing` level for this instance's own spans and events.
    /// Never installs a subscriber; purely advisory for a caller building
    /// their own `EnvFilter`.
    pub logging_level: tracing::Level,
    /// Size of each per-flow update queue before `enqueue` starts returning
    /// [`MotionError::Backpressure`].
    pub queue_capacity: usize,
    /// TTL of the distributed lock guarding state writes.
    pub lock_ttl: Duration,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            update_task_type: WorkerMode::default(),
            disable_update_task: false,
            flush_on_exit: false,
            cache_ttl: Duration::from_secs(300),
            redis_socket_timeout: Duration::from_secs(5),
            logging_level: tracing::Level::INFO,
            queue_capacity: 1024,
            lock_ttl: Duration::from_secs(60),
        }
    }
}

impl InstanceOptions {
    /// Validates the combination of options, matching the reference
    /// implementation's constructor-time `ValueError` for `flush_on_exit`
    /// requested on an instance with updates disabled entirely.
    pub fn validate(&self) -> Result<(), MotionError> {
        if self.disable_update_task && self.flush_on_exit {
            return Err(MotionError::InvalidConfig(
                "flush_on_exit has no effect when disable_update_task is set".into(),
            ));
        }
        if self.update_task_type == WorkerMode::Process {
            return Err(MotionError::Unsupported);
        }
        Ok(())
    }
}
