//! Wire shapes of the platform REST API.

use serde::{Deserialize, Serialize};

use capbridge_app::ports::platform::ComponentStatuses;
use capbridge_domain::capability::{Capability, ComponentId};
use capbridge_domain::command::Command;
use capbridge_domain::device::{Component, Device, Location};
use capbridge_domain::id::{DeviceId, LocationId};
use capbridge_domain::status::HealthState;

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(rename = "_links", default)]
    pub links: Option<Links>,
}

impl<T> Page<T> {
    pub fn next(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|links| links.next.as_ref())
            .map(|link| link.href.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct Links {
    pub next: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub location_id: String,
    pub name: String,
}

impl LocationDto {
    pub fn into_location(self) -> Option<Location> {
        Some(Location {
            id: self.location_id.parse::<LocationId>().ok()?,
            name: self.name,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manufacturer_name: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub ocf: Option<OcfDto>,
    #[serde(default)]
    pub components: Vec<ComponentDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcfDto {
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentDto {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRef>,
    #[serde(default)]
    pub categories: Vec<CategoryDto>,
}

#[derive(Debug, Deserialize)]
pub struct CapabilityRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryDto {
    pub name: String,
}

impl DeviceDto {
    /// Convert to the domain model. Returns `None` for a malformed id or a
    /// device without any usable component.
    pub fn into_device(self) -> Option<Device> {
        let mut builder = Device::builder()
            .id(self.device_id.parse::<DeviceId>().ok()?)
            .label(self.label.or(self.name).unwrap_or_default());
        if let Some(manufacturer) = self.manufacturer_name {
            builder = builder.manufacturer(manufacturer);
        }
        if let Some(location_id) = self.location_id.and_then(|id| id.parse::<LocationId>().ok()) {
            builder = builder.location_id(location_id);
        }
        if let Some(device_type) = self.ocf.and_then(|ocf| ocf.device_type) {
            builder = builder.category(device_type);
        }
        for component in self.components {
            let Ok(id) = ComponentId::new(component.id) else {
                continue;
            };
            let capabilities = component
                .capabilities
                .into_iter()
                .filter_map(|cap| Capability::new(cap.id).ok());
            let categories = component.categories.into_iter().map(|c| c.name).collect();
            builder = builder.component(Component::new(id, capabilities).with_categories(categories));
        }
        builder.build().ok()
    }
}

/// `GET /devices/{id}/status`
#[derive(Debug, Deserialize)]
pub struct StatusDto {
    #[serde(default)]
    pub components: ComponentStatuses,
}

/// `GET /devices/{id}/health`
#[derive(Debug, Deserialize)]
pub struct HealthDto {
    pub state: HealthState,
}

/// `POST /devices/{id}/commands`
#[derive(Debug, Serialize)]
pub struct CommandsRequest<'a> {
    pub commands: &'a [Command],
}
