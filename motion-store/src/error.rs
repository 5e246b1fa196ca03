//! Error types for state store operations.

use thiserror::Error;

/// Error type for [`crate::StateStore`] operations.
///
/// Mirrors the categorization used across the cache-backend lineage this
/// crate descends from: a connectivity bucket, an internal-state bucket, and
/// a dedicated variant for the one operation (`lock`) that has its own
/// well-defined timeout failure mode.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached, or timed out, after any internal
    /// retries the backend chooses to perform. The engine never retries a
    /// `BackendUnavailable` itself — retry policy belongs to the caller.
    #[error("state store backend unavailable: {0}")]
    BackendUnavailable(Box<dyn std::error::Error + Send + Sync>),

    /// A named lock could not be acquired within its caller-specified
    /// timeout.
    #[error("lock {name:?} not acquired within timeout")]
    LockContention {
        /// Name of the lock that was contended.
        name: String,
    },

    /// An internal error not related to network interaction (e.g. a codec
    /// failure while encoding a value to store).
    #[error("state store internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps an arbitrary error as [`StoreError::BackendUnavailable`].
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::BackendUnavailable(Box::new(err))
    }

    /// Wraps an arbitrary error as [`StoreError::Internal`].
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(Box::new(err))
    }
}
