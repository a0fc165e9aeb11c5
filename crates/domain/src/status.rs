//! Status snapshot: the last known state of every component of a device.
//!
//! The platform reports status as a tree
//! `capability → attribute → { value, unit, timestamp }` per component.
//! A snapshot is timestamped as a whole, never per field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::ComponentId;
use crate::time::Timestamp;

/// Status tree of a single component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentStatus(serde_json::Map<String, serde_json::Value>);

impl ComponentStatus {
    #[must_use]
    pub fn new(tree: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(tree)
    }

    /// The reported `value` of `capability.attribute`, if any.
    #[must_use]
    pub fn value(&self, capability: &str, attribute: &str) -> Option<&serde_json::Value> {
        self.0
            .get(capability)?
            .get(attribute)?
            .get("value")
            .filter(|v| !v.is_null())
    }

    /// Attribute names reported for a capability.
    pub fn attributes(&self, capability: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(capability)
            .and_then(serde_json::Value::as_object)
            .into_iter()
            .flat_map(|attrs| attrs.keys().map(String::as_str))
    }
}

/// Status of every component of a device, fetched in a single remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub components: BTreeMap<ComponentId, ComponentStatus>,
    pub fetched_at: Timestamp,
}

impl StatusSnapshot {
    #[must_use]
    pub fn new(components: BTreeMap<ComponentId, ComponentStatus>, fetched_at: Timestamp) -> Self {
        Self {
            components,
            fetched_at,
        }
    }

    #[must_use]
    pub fn component(&self, id: &str) -> Option<&ComponentStatus> {
        self.components.get(id)
    }
}

/// Connectivity as reported by the platform's health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Online,
    Offline,
    #[serde(other)]
    Unknown,
}

impl HealthState {
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}
