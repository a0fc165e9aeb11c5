//! Capabilities and components: the addressable surface of a device.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque identifier naming one controllable or observable facet of a
/// component (e.g. `switch`, `switchLevel`, `samsungvd.mediaInputSource`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Create a capability identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCapability`] when `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::EmptyCapability);
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a component inside a device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// The distinguished primary component.
    pub const MAIN: &'static str = "main";

    /// Create a component identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyComponentId`] when `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::EmptyComponentId);
        }
        Ok(Self(id))
    }

    /// The `main` component.
    #[must_use]
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::main()
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn should_reject_empty_capability() {
        assert_eq!(Capability::new(""), Err(ValidationError::EmptyCapability));
    }

    #[test]
    fn should_reject_empty_component_id() {
        assert_eq!(ComponentId::new(""), Err(ValidationError::EmptyComponentId));
    }

    #[test]
    fn should_look_up_capability_set_by_str() {
        let set: BTreeSet<Capability> = ["switch", "switchLevel"]
            .into_iter()
            .map(|c| Capability::new(c).unwrap())
            .collect();
        assert!(set.contains("switchLevel"));
        assert!(!set.contains("fanSpeed"));
    }

    #[test]
    fn should_default_component_to_main() {
        let id = ComponentId::default();
        assert!(id.is_main());
        assert_eq!(id.to_string(), "main");
    }
}
