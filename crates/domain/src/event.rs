//! Device event: a pushed change notification for one attribute.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, ComponentId};
use crate::id::DeviceId;

/// One attribute change pushed by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device_id: DeviceId,
    pub component_id: ComponentId,
    pub capability: Capability,
    pub attribute: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
}

impl DeviceEvent {
    /// Whether the event targets the given component capability.
    #[must_use]
    pub fn targets(&self, component: &ComponentId, capability: &Capability) -> bool {
        &self.component_id == component && &self.capability == capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_component_and_capability() {
        let event = DeviceEvent {
            device_id: DeviceId::new(),
            component_id: ComponentId::main(),
            capability: Capability::new("switch").unwrap(),
            attribute: "switch".to_string(),
            value: serde_json::json!("on"),
            unit: None,
        };
        assert!(event.targets(&ComponentId::main(), &Capability::new("switch").unwrap()));
        assert!(!event.targets(
            &ComponentId::new("outlet2").unwrap(),
            &Capability::new("switch").unwrap()
        ));
    }
}
