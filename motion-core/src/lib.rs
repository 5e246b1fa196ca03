#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! Shared data model for the Motion execution engine.
//!
//! This crate has no knowledge of storage backends or the tokio runtime — it
//! only defines the vocabulary the rest of the `motion` workspace builds on:
//! instance identity, flow keys, request fingerprints, and the state
//! dictionary shape. Analogous to `hitbox-core` in the cache-framework
//! lineage this crate is adapted from.

/// The composite key identifying a cached serve result.
pub mod cache_key;
/// Instance identity and derived store keys.
pub mod instance;
/// Flow keys and request fingerprints.
pub mod key;
/// The state dictionary and merge semantics.
pub mod state;

pub use cache_key::CacheEntryKey;
pub use instance::InstanceName;
pub use key::{CanonicalizeError, Fingerprint, FlowKey};
pub use state::{StateMap, StateValue, Version, merge_state};
