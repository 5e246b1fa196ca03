#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Result cache keyed by `(flow_key, version, fingerprint)`.
pub mod cache;
/// Route registration: [`component::Component`]/[`component::ComponentBuilder`].
pub mod component;
/// Instance configuration: [`config::InstanceOptions`], [`config::WorkerMode`].
pub mod config;
/// The engine error type, [`error::MotionError`].
pub mod error;
/// Serve route shapes and the dispatch algorithm.
pub mod executor;
/// A running component instance.
pub mod instance;
/// Optional `metrics`-crate instrumentation, gated behind the `metrics` feature.
pub mod metrics;
/// Per-flow FIFO update queues.
pub mod queue;
/// Explicit instance shutdown registry.
pub mod registry;
/// The versioned, store-backed state container.
pub mod state;
/// Update worker pool.
pub mod worker;

pub use cache::ResultCache;
pub use component::{Component, ComponentBuilder};
pub use config::{InstanceOptions, WorkerMode};
pub use error::MotionError;
pub use executor::{DispatchOptions, ServeRoute, UpdateRoute};
pub use instance::{ComponentInstance, Lifecycle};
pub use queue::{QueueMessage, UpdateJob, UpdateQueueSet};
pub use registry::{InstanceRegistry, ShutdownHandle};
pub use state::{StateSnapshot, VersionedState};
pub use worker::{UpdateFn, UpdateWorkerPool};

/// The `motion` prelude.
///
/// ```rust
/// use motion::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Component, ComponentInstance, DispatchOptions, InstanceOptions, MotionError, ServeRoute,
        WorkerMode,
    };
}
