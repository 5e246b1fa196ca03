//! Error types for the Redis state store.

use motion_store::StoreError;

/// Error type for Redis state store operations.
///
/// Wraps errors from the underlying [`redis`] crate, exactly as
/// `hitbox_redis::Error` wraps [`redis::RedisError`] before converting into
/// the shared backend error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client: connection failures,
    /// protocol errors, authentication failures, command execution errors.
    #[error("redis state store error: {0}")]
    Redis(#[from] redis::RedisError),

    /// `RedisStoreBuilder::build` was called without a connection URL.
    #[error("redis connection url not specified; call .server() before .build()")]
    MissingServer,
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        match error {
            Error::Redis(_) => StoreError::unavailable(error),
            Error::MissingServer => StoreError::internal(error),
        }
    }
}
