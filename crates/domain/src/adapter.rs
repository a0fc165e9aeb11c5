//! Adapter kinds and bindings: the outcome of capability composition.
//!
//! Composition runs once per component at registration time and produces
//! [`AdapterBinding`]s: an [`AdapterKind`] together with the capabilities it
//! owns. The kind is a closed set so dispatch is decided at composition time,
//! never re-evaluated per call.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, ComponentId};

/// Protocol-facing adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Television,
    TelevisionSpeaker,
    AirConditioner,
    Thermostat,
    AirPurifier,
    Fan,
    Light,
    WindowCovering,
    Switch,
    Lock,
    GarageDoor,
    Valve,
    ContactSensor,
    MotionSensor,
    OccupancySensor,
    LeakSensor,
    SmokeSensor,
    CarbonMonoxideSensor,
    TemperatureSensor,
    HumiditySensor,
    LightSensor,
    AirQualitySensor,
    Button,
    Battery,
    SecuritySystem,
}

impl AdapterKind {
    /// Name of the protocol service the adapter exposes.
    #[must_use]
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Television => "Television",
            Self::TelevisionSpeaker => "TelevisionSpeaker",
            Self::AirConditioner => "HeaterCooler",
            Self::Thermostat => "Thermostat",
            Self::AirPurifier => "AirPurifier",
            Self::Fan => "Fanv2",
            Self::Light => "Lightbulb",
            Self::WindowCovering => "WindowCovering",
            Self::Switch => "Switch",
            Self::Lock => "LockMechanism",
            Self::GarageDoor => "GarageDoorOpener",
            Self::Valve => "Valve",
            Self::ContactSensor => "ContactSensor",
            Self::MotionSensor => "MotionSensor",
            Self::OccupancySensor => "OccupancySensor",
            Self::LeakSensor => "LeakSensor",
            Self::SmokeSensor => "SmokeSensor",
            Self::CarbonMonoxideSensor => "CarbonMonoxideSensor",
            Self::TemperatureSensor => "TemperatureSensor",
            Self::HumiditySensor => "HumiditySensor",
            Self::LightSensor => "LightSensor",
            Self::AirQualitySensor => "AirQualitySensor",
            Self::Button => "StatelessProgrammableSwitch",
            Self::Battery => "Battery",
            Self::SecuritySystem => "SecuritySystem",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// One adapter instance to build: its kind, component and owned capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterBinding {
    pub kind: AdapterKind,
    pub component_id: ComponentId,
    pub capabilities: BTreeSet<Capability>,
}

impl AdapterBinding {
    #[must_use]
    pub fn owns(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_kind_from_snake_case() {
        let kind: AdapterKind = serde_json::from_str("\"carbon_monoxide_sensor\"").unwrap();
        assert_eq!(kind, AdapterKind::CarbonMonoxideSensor);
    }

    #[test]
    fn should_display_protocol_service_name() {
        assert_eq!(AdapterKind::Fan.to_string(), "Fanv2");
        assert_eq!(AdapterKind::Lock.to_string(), "LockMechanism");
    }

    #[test]
    fn should_report_owned_capabilities() {
        let binding = AdapterBinding {
            kind: AdapterKind::Light,
            component_id: ComponentId::main(),
            capabilities: ["switch", "switchLevel"]
                .into_iter()
                .map(|c| Capability::new(c).unwrap())
                .collect(),
        };
        assert!(binding.owns("switchLevel"));
        assert!(!binding.owns("colorControl"));
    }
}
