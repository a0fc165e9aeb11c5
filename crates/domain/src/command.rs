//! Command: one remote instruction addressed to a component capability.
//!
//! Commands are always submitted to the platform in batches.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, ComponentId};

/// A single command, e.g. `switchLevel.setLevel(40)` on the `main` component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub component: ComponentId,
    pub capability: Capability,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

impl Command {
    /// Command without arguments on the `main` component.
    #[must_use]
    pub fn new(capability: Capability, command: impl Into<String>) -> Self {
        Self {
            component: ComponentId::main(),
            capability,
            command: command.into(),
            arguments: Vec::new(),
        }
    }

    #[must_use]
    pub fn on_component(mut self, component: ComponentId) -> Self {
        self.component = component;
        self
    }

    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<serde_json::Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }
}
