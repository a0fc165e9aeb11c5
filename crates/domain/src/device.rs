//! Device: a physical thing exposed by the remote platform.
//!
//! A device is made of one or more [`Component`]s, each declaring its own
//! capability set. Devices are created from the discovery listing and are
//! immutable for the lifetime of the process.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, ComponentId};
use crate::error::ValidationError;
use crate::id::{DeviceId, LocationId};

/// A sub-addressable unit of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    /// Declared capabilities in discovery order, without duplicates.
    pub capabilities: Vec<Capability>,
    /// Category names reported for this component (e.g. `Television`).
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Component {
    /// Create a component, dropping duplicate capabilities while keeping
    /// the first occurrence's position.
    #[must_use]
    pub fn new(id: ComponentId, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut seen = BTreeSet::new();
        let capabilities = capabilities
            .into_iter()
            .filter(|cap| seen.insert(cap.clone()))
            .collect();
        Self {
            id,
            capabilities,
            categories: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// The declared capabilities as a set.
    #[must_use]
    pub fn capability_set(&self) -> BTreeSet<Capability> {
        self.capabilities.iter().cloned().collect()
    }

    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == capability)
    }
}

/// A device as reported by the platform's discovery listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub label: String,
    pub manufacturer: Option<String>,
    pub location_id: Option<LocationId>,
    /// Device-level category (e.g. the OCF device type).
    pub category: Option<String>,
    pub components: Vec<Component>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoComponents`] when the device declares
    /// no component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.components.is_empty() {
            return Err(ValidationError::NoComponents);
        }
        Ok(())
    }

    /// Find a component by id.
    #[must_use]
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id.as_str() == id)
    }

    /// Metadata the capability resolver uses for device-type heuristics.
    #[must_use]
    pub fn meta(&self, component: &Component) -> DeviceMeta {
        let mut categories: Vec<String> = self.category.iter().cloned().collect();
        categories.extend(component.categories.iter().cloned());
        DeviceMeta {
            label: self.label.clone(),
            manufacturer: self.manufacturer.clone(),
            categories,
        }
    }
}

/// Descriptive metadata about the device a component belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMeta {
    pub label: String,
    pub manufacturer: Option<String>,
    /// Device-level category followed by the component's categories.
    pub categories: Vec<String>,
}

impl DeviceMeta {
    /// Case-insensitive category match.
    #[must_use]
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// A platform location (a home) devices belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    label: Option<String>,
    manufacturer: Option<String>,
    location_id: Option<LocationId>,
    category: Option<String>,
    components: Vec<Component>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn location_id(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoComponents`] if no component was added.
    pub fn build(self) -> Result<Device, ValidationError> {
        let device = Device {
            id: self.id.unwrap_or_default(),
            label: self.label.unwrap_or_default(),
            manufacturer: self.manufacturer,
            location_id: self.location_id,
            category: self.category,
            components: self.components,
        };
        device.validate()?;
        Ok(device)
    }
}
