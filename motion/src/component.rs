//! Route registration: the Rust substitute for the decorator-based
//! registration surface, built as a plain accumulating builder rather than
//! `hitbox::config::ConfigBuilder`'s full typestate — registration here
//! accumulates maps keyed by flow, not single required fields, so there is
//! no "have you called every setter" state worth encoding in the type.

use std::collections::HashMap;
use std::sync::Arc;

use motion_core::state::StateMap;
use motion_core::{FlowKey, InstanceName};
use motion_store::StateStore;
use smol_str::SmolStr;

use crate::config::InstanceOptions;
use crate::error::MotionError;
use crate::executor::{ServeRoute, UpdateRoute};
use crate::instance::ComponentInstance;
use crate::worker::UpdateFn;

/// A registered component: its name, initial-state factory, and the serve
/// and update routes every instance of it shares.
pub struct Component<Props, Res> {
    name: SmolStr,
    init_state: Arc<dyn Fn() -> StateMap + Send + Sync>,
    serves: HashMap<FlowKey, ServeRoute<Props, Res>>,
    updates: HashMap<FlowKey, UpdateRoute<Props, Res>>,
}

impl<Props, Res> Component<Props, Res>
where
    Props: serde::Serialize + Clone + Send + Sync + 'static,
    Res: Clone + Send + Sync + 'static,
{
    /// Starts building a component named `name`.
    pub fn new(name: impl Into<SmolStr>) -> ComponentBuilder<Props, Res> {
        ComponentBuilder::new(name)
    }

    /// Constructs one instance of this component, backed by `store`.
    ///
    /// This only wires up the dispatcher and spawns worker tasks — it does
    /// not touch the store. Call
    /// [`ComponentInstance::initialize_default`] (or
    /// [`ComponentInstance::initialize`] with explicit state) afterward.
    pub fn instance(
        &self,
        instance_id: impl Into<SmolStr>,
        store: Arc<dyn StateStore>,
        options: InstanceOptions,
    ) -> Result<ComponentInstance<Props, Res>, MotionError> {
        let name = InstanceName::new(self.name.clone(), instance_id.into());
        ComponentInstance::build(
            name,
            store,
            self.serves.clone_routes(),
            self.updates.clone_routes(),
            Arc::clone(&self.init_state),
            options,
        )
    }

    /// The component's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`Component`].
pub struct ComponentBuilder<Props, Res> {
    name: SmolStr,
    init_state: Option<Arc<dyn Fn() -> StateMap + Send + Sync>>,
    serves: HashMap<FlowKey, ServeRoute<Props, Res>>,
    updates: HashMap<FlowKey, UpdateRoute<Props, Res>>,
}

impl<Props, Res> ComponentBuilder<Props, Res>
where
    Props: serde::Serialize + Clone + Send + Sync + 'static,
    Res: Clone + Send + Sync + 'static,
{
    fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            init_state: None,
            serves: HashMap::new(),
            updates: HashMap::new(),
        }
    }

    /// Sets the factory producing this component's initial state, used by
    /// [`ComponentInstance::initialize_default`].
    pub fn init_state<F>(mut self, f: F) -> Self
    where
        F: Fn() -> StateMap + Send + Sync + 'static,
    {
        self.init_state = Some(Arc::new(f));
        self
    }

    /// Registers a serve route under `flow_key`.
    pub fn serve(mut self, flow_key: impl Into<FlowKey>, route: ServeRoute<Props, Res>) -> Self {
        self.serves.insert(flow_key.into(), route);
        self
    }

    /// Registers a batch update route under `flow_key`.
    pub fn update(mut self, flow_key: impl Into<FlowKey>, batch_size: usize, func: UpdateFn<Props, Res>) -> Self {
        self.updates.insert(flow_key.into(), UpdateRoute { batch_size, func });
        self
    }

    /// Registers a single-item update route under `flow_key`: a convenience
    /// wrapper for `batch_size == 1` that unwraps the singleton vectors
    /// before calling a simpler per-item closure, resolving the spec's open
    /// question about the update function signature at `batch_size == 1`.
    pub fn update_single<F>(mut self, flow_key: impl Into<FlowKey>, func: F) -> Self
    where
        F: Fn(&crate::state::StateSnapshot, Props, Res) -> StateMap + Send + Sync + 'static,
    {
        let wrapped: UpdateFn<Props, Res> = Arc::new(move |snapshot, mut props, mut results| {
            let prop = props.pop().expect("batch_size=1 update called with empty batch");
            let result = results.pop().expect("batch_size=1 update called with empty batch");
            func(snapshot, prop, result)
        });
        self.updates
            .insert(flow_key.into(), UpdateRoute { batch_size: 1, func: wrapped });
        self
    }

    /// Finalizes the component.
    ///
    /// Dynamic routing is resolved at this boundary, not at dispatch time:
    /// once built, a flow key either exists in `serves` or it doesn't, and
    /// [`crate::error::MotionError::UnknownFlow`] is only possible for a key
    /// that was genuinely never registered here.
    pub fn build(self) -> Component<Props, Res> {
        Component {
            name: self.name,
            init_state: self.init_state.unwrap_or_else(|| Arc::new(StateMap::new)),
            serves: self.serves,
            updates: self.updates,
        }
    }
}

trait CloneRoutes {
    fn clone_routes(&self) -> Self;
}

impl<Props, Res> CloneRoutes for HashMap<FlowKey, ServeRoute<Props, Res>> {
    fn clone_routes(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.clone_route())).collect()
    }
}

impl<Props, Res> CloneRoutes for HashMap<FlowKey, UpdateRoute<Props, Res>> {
    fn clone_routes(&self) -> Self {
        self.iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    UpdateRoute {
                        batch_size: v.batch_size,
                        func: Arc::clone(&v.func),
                    },
                )
            })
            .collect()
    }
}

impl<Props, Res> ServeRoute<Props, Res> {
    fn clone_route(&self) -> Self {
        match self {
            ServeRoute::Value(f) => ServeRoute::Value(Arc::clone(f)),
            ServeRoute::Sequence(f) => ServeRoute::Sequence(Arc::clone(f)),
            ServeRoute::AsyncValue(f) => ServeRoute::AsyncValue(Arc::clone(f)),
            ServeRoute::AsyncSequence(f) => ServeRoute::AsyncSequence(Arc::clone(f)),
        }
    }
}
