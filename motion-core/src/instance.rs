//! Instance identity.

use std::fmt;

use smol_str::SmolStr;

/// Identity of a single component instance.
///
/// All external store keys are derived from this: `state:<instance_name>`,
/// `version:<instance_name>`, `lock:state:<instance_name>`, and
/// `chan:flush:<instance_name>:<flow_key>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceName {
    component: SmolStr,
    instance_id: SmolStr,
    full: SmolStr,
}

impl InstanceName {
    /// Builds an instance name from a component name and instance id.
    ///
    /// The wire form is `"<component>__<instance_id>"`.
    pub fn new(component: impl Into<SmolStr>, instance_id: impl Into<SmolStr>) -> Self {
        let component = component.into();
        let instance_id = instance_id.into();
        let full = SmolStr::new(format!("{component}__{instance_id}"));
        Self {
            component,
            instance_id,
            full,
        }
    }

    /// The component name half of the instance name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The instance id half of the instance name.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The full `"<component>__<instance_id>"` string.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The store key holding the serialized state dictionary.
    pub fn state_key(&self) -> SmolStr {
        SmolStr::new(format!("state:{}", self.full))
    }

    /// The store key holding the persisted version counter.
    pub fn version_key(&self) -> SmolStr {
        SmolStr::new(format!("version:{}", self.full))
    }

    /// The distributed lock name guarding writes to the state key.
    pub fn state_lock_name(&self) -> SmolStr {
        SmolStr::new(format!("lock:state:{}", self.full))
    }

    /// The pub/sub channel used to announce flush completion for a flow key.
    pub fn flush_channel(&self, flow_key: &str) -> SmolStr {
        SmolStr::new(format!("chan:flush:{}:{flow_key}", self.full))
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_component_double_underscore_id() {
        let name = InstanceName::new("Recommender", "abc123");
        assert_eq!(name.as_str(), "Recommender__abc123");
        assert_eq!(name.component(), "Recommender");
        assert_eq!(name.instance_id(), "abc123");
    }

    #[test]
    fn derives_store_keys() {
        let name = InstanceName::new("C", "i");
        assert_eq!(name.state_key(), "state:C__i");
        assert_eq!(name.version_key(), "version:C__i");
        assert_eq!(name.state_lock_name(), "lock:state:C__i");
        assert_eq!(name.flush_channel("add"), "chan:flush:C__i:add");
    }
}
