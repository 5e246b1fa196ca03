#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Pluggable encoding for opaque state values.
pub mod codec;
/// Error types for state store operations.
pub mod error;
/// In-memory [`StateStore`] implementation for tests and single-process use.
pub mod memory;
/// The [`StateStore`] trait.
pub mod store;

pub use codec::{BincodeCodec, CodecError, JsonCodec, StateCodec};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{LockToken, StateStore, StoreResult};
