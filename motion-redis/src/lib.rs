#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// The [`RedisStore`] [`motion_store::StateStore`] implementation.
pub mod backend;
/// Error types for Redis state store operations.
pub mod error;

pub use backend::{RedisStore, RedisStoreBuilder};
pub use error::Error;
