//! Explicit instance registry, standing in for Python's `atexit`.
//!
//! Rust has no process-exit hook equivalent to `atexit`, so rather than a
//! module-level singleton the redesign calls for, shutdown registration is
//! explicit: a binary's `main` constructs one [`InstanceRegistry`], registers
//! each instance it creates, and wires a signal handler (or its own shutdown
//! sequence) to call [`InstanceRegistry::shutdown_all`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;
use tracing::info;

type ShutdownFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A registered shutdown callback, typically `ComponentInstance::shutdown`
/// adapted to a boxed future.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<dyn Fn() -> ShutdownFuture + Send + Sync>);

impl ShutdownHandle {
    /// Wraps a closure producing a shutdown future.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(f()) as ShutdownFuture))
    }
}

/// Tracks shutdown callbacks for every instance a binary wants torn down
/// together, e.g. on `SIGTERM`.
#[derive(Default)]
pub struct InstanceRegistry {
    handles: DashMap<SmolStr, ShutdownHandle>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `name`, replacing any prior registration.
    pub fn register(&self, name: impl Into<SmolStr>, handle: ShutdownHandle) {
        self.handles.insert(name.into(), handle);
    }

    /// Removes a registration without invoking it.
    pub fn deregister(&self, name: &str) {
        self.handles.remove(name);
    }

    /// Invokes every registered shutdown callback, one at a time, then
    /// clears the registry.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(SmolStr, ShutdownHandle)> =
            self.handles.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        for (name, handle) in handles {
            info!(instance = %name, "shutting down registered instance");
            (handle.0)().await;
        }
        self.handles.clear();
    }
}
