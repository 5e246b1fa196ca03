//! Metrics declarations, gated behind the `metrics` feature.
//!
//! Same shape as `hitbox::metrics`: `lazy_static` metric-name handles plus a
//! `record_*` helper that is a complete no-op (and should be optimized away)
//! when the feature is disabled.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total dispatcher calls, by flow and outcome (`hit`/`miss`).
    pub static ref DISPATCH_TOTAL: &'static str = {
        metrics::describe_counter!(
            "motion_dispatch_total",
            "Total number of dispatcher calls, labeled by flow and cache outcome."
        );
        "motion_dispatch_total"
    };
    /// Total update jobs enqueued.
    pub static ref UPDATE_JOBS_ENQUEUED: &'static str = {
        metrics::describe_counter!(
            "motion_update_jobs_enqueued_total",
            "Total number of update jobs enqueued."
        );
        "motion_update_jobs_enqueued_total"
    };
    /// Total update jobs rejected for backpressure.
    pub static ref UPDATE_JOBS_REJECTED: &'static str = {
        metrics::describe_counter!(
            "motion_update_jobs_rejected_total",
            "Total number of update jobs rejected because the queue was full."
        );
        "motion_update_jobs_rejected_total"
    };
    /// Total update batches applied.
    pub static ref UPDATE_BATCHES_APPLIED: &'static str = {
        metrics::describe_counter!(
            "motion_update_batches_applied_total",
            "Total number of update batches successfully applied to the state store."
        );
        "motion_update_batches_applied_total"
    };
    /// Total lock contention events while applying a state update.
    pub static ref LOCK_CONTENTION_TOTAL: &'static str = {
        metrics::describe_counter!(
            "motion_lock_contention_total",
            "Total number of times acquiring the state lock failed after exhausting retries."
        );
        "motion_lock_contention_total"
    };
}

/// Records a dispatcher call outcome.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_dispatch(flow: &str, hit: bool) {
    metrics::counter!(*DISPATCH_TOTAL, "flow" => flow.to_string(), "outcome" => if hit { "hit" } else { "miss" })
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_dispatch(_flow: &str, _hit: bool) {}

/// Records an update job successfully enqueued onto a flow's queue.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_enqueue(flow: &str) {
    metrics::counter!(*UPDATE_JOBS_ENQUEUED, "flow" => flow.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_enqueue(_flow: &str) {}

/// Records an update job rejected because its flow's queue was full.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_reject(flow: &str) {
    metrics::counter!(*UPDATE_JOBS_REJECTED, "flow" => flow.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_reject(_flow: &str) {}

/// Records an update batch successfully applied to the state store.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_batch_applied(flow: &str) {
    metrics::counter!(*UPDATE_BATCHES_APPLIED, "flow" => flow.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_batch_applied(_flow: &str) {}

/// Records a state lock acquisition that failed after exhausting retries.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_lock_contention(name: &str) {
    metrics::counter!(*LOCK_CONTENTION_TOTAL, "lock" => name.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_lock_contention(_name: &str) {}
