//! Capability resolver: composes a component's capabilities into adapters.
//!
//! Resolution is a deterministic, order-sensitive greedy cover:
//!
//! 1. device-type heuristics claim their subsets first (television, then
//!    television speaker);
//! 2. combination rules, largest required set first (ties keep table order),
//!    each binding `required ∪ (optional ∩ remaining)`;
//! 3. single-capability rules in declaration order, subject to feature gates;
//! 4. whatever remains is left unexposed.
//!
//! The order is a contract. A different order could cover more capabilities
//! for unusual combinations; that is accepted, not fixed.

use std::collections::BTreeSet;

use serde::Deserialize;

use capbridge_domain::adapter::{AdapterBinding, AdapterKind};
use capbridge_domain::capability::{Capability, ComponentId};
use capbridge_domain::device::{Device, DeviceMeta};

/// What to do with the legacy `mediaInputSource` capability when a
/// television also reports the vendor-specific one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyInputPolicy {
    /// Bind it to the television adapter alongside the vendor capability.
    #[default]
    Retain,
    /// Claim it without binding it anywhere.
    Drop,
}

/// Feature gates for the resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Enable the television heuristic.
    pub television: bool,
    /// Enable the television speaker heuristic.
    pub television_speaker: bool,
    pub legacy_input_policy: LegacyInputPolicy,
    /// Single-capability adapter kinds that must not be built.
    pub disabled_adapters: Vec<AdapterKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            television: true,
            television_speaker: true,
            legacy_input_policy: LegacyInputPolicy::Retain,
            disabled_adapters: Vec::new(),
        }
    }
}

const LEGACY_INPUT_SOURCE: &str = "mediaInputSource";
const VENDOR_INPUT_SOURCE: &str = "samsungvd.mediaInputSource";

/// Capabilities the television adapter may claim.
const TELEVISION_CAPABILITIES: &[&str] = &[
    "switch",
    LEGACY_INPUT_SOURCE,
    VENDOR_INPUT_SOURCE,
    "tvChannel",
    "mediaPlayback",
    "samsungvd.remoteControl",
    "custom.picturemode",
];

const TELEVISION_CATEGORIES: &[&str] = &["Television", "oic.d.tv"];

const SPEAKER_REQUIRED: &str = "audioVolume";
const SPEAKER_OPTIONAL: &[&str] = &["audioMute"];

/// A set of capabilities one adapter kind covers jointly.
#[derive(Debug)]
struct CombinationRule {
    kind: AdapterKind,
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

const COMBINATION_RULES: &[CombinationRule] = &[
    CombinationRule {
        kind: AdapterKind::AirConditioner,
        required: &[
            "switch",
            "airConditionerMode",
            "thermostatCoolingSetpoint",
            "temperatureMeasurement",
        ],
        optional: &[
            "airConditionerFanMode",
            "fanOscillationMode",
            "relativeHumidityMeasurement",
        ],
    },
    CombinationRule {
        kind: AdapterKind::Thermostat,
        required: &[
            "temperatureMeasurement",
            "thermostatMode",
            "thermostatHeatingSetpoint",
            "thermostatCoolingSetpoint",
        ],
        optional: &[
            "thermostatOperatingState",
            "thermostatFanMode",
            "relativeHumidityMeasurement",
        ],
    },
    CombinationRule {
        kind: AdapterKind::Fan,
        required: &["switch", "fanSpeed", "switchLevel"],
        optional: &["fanOscillationMode"],
    },
    CombinationRule {
        kind: AdapterKind::AirPurifier,
        required: &["switch", "airPurifierFanMode"],
        optional: &["dustSensor", "fineDustSensor", "airQualitySensor"],
    },
    CombinationRule {
        kind: AdapterKind::WindowCovering,
        required: &["windowShade", "windowShadeLevel"],
        optional: &[],
    },
    CombinationRule {
        kind: AdapterKind::WindowCovering,
        required: &["windowShade", "switchLevel"],
        optional: &[],
    },
    CombinationRule {
        kind: AdapterKind::Light,
        required: &["switch", "switchLevel"],
        optional: &["colorControl", "colorTemperature"],
    },
    CombinationRule {
        kind: AdapterKind::Fan,
        required: &["switch", "fanSpeed"],
        optional: &["fanOscillationMode"],
    },
    CombinationRule {
        kind: AdapterKind::Light,
        required: &["switch", "colorTemperature"],
        optional: &["colorControl"],
    },
    CombinationRule {
        kind: AdapterKind::Light,
        required: &["switch", "colorControl"],
        optional: &[],
    },
];

const SINGLE_RULES: &[(&str, AdapterKind)] = &[
    ("switch", AdapterKind::Switch),
    ("switchLevel", AdapterKind::Light),
    ("lock", AdapterKind::Lock),
    ("garageDoorControl", AdapterKind::GarageDoor),
    ("doorControl", AdapterKind::GarageDoor),
    ("windowShade", AdapterKind::WindowCovering),
    ("valve", AdapterKind::Valve),
    ("contactSensor", AdapterKind::ContactSensor),
    ("motionSensor", AdapterKind::MotionSensor),
    ("presenceSensor", AdapterKind::OccupancySensor),
    ("waterSensor", AdapterKind::LeakSensor),
    ("smokeDetector", AdapterKind::SmokeSensor),
    ("carbonMonoxideDetector", AdapterKind::CarbonMonoxideSensor),
    ("temperatureMeasurement", AdapterKind::TemperatureSensor),
    ("relativeHumidityMeasurement", AdapterKind::HumiditySensor),
    ("illuminanceMeasurement", AdapterKind::LightSensor),
    ("airQualitySensor", AdapterKind::AirQualitySensor),
    ("button", AdapterKind::Button),
    ("securitySystem", AdapterKind::SecuritySystem),
    ("battery", AdapterKind::Battery),
];

/// Greedy capability-to-adapter composition.
pub struct CapabilityResolver {
    config: ResolverConfig,
    combinations: Vec<&'static CombinationRule>,
}

impl CapabilityResolver {
    /// Create a resolver; the combination table is ordered once here.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        let mut combinations: Vec<&'static CombinationRule> = COMBINATION_RULES.iter().collect();
        // stable: equal sizes keep table order
        combinations.sort_by(|a, b| b.required.len().cmp(&a.required.len()));
        Self {
            config,
            combinations,
        }
    }

    /// Resolve every component of a device.
    #[must_use]
    pub fn resolve_device(&self, device: &Device) -> Vec<AdapterBinding> {
        device
            .components
            .iter()
            .flat_map(|component| {
                self.resolve(
                    &component.id,
                    &component.capability_set(),
                    &device.meta(component),
                )
            })
            .collect()
    }

    /// Resolve one component's capability set into adapter bindings.
    ///
    /// Never fails; an empty result means nothing is exposed.
    #[tracing::instrument(skip(self, capabilities, meta), fields(device = %meta.label))]
    pub fn resolve(
        &self,
        component_id: &ComponentId,
        capabilities: &BTreeSet<Capability>,
        meta: &DeviceMeta,
    ) -> Vec<AdapterBinding> {
        let mut remaining = capabilities.clone();
        let mut bindings = Vec::new();

        if let Some(binding) = self.claim_television(component_id, &mut remaining, meta) {
            bindings.push(binding);
        }
        if let Some(binding) = self.claim_speaker(component_id, &mut remaining) {
            bindings.push(binding);
        }

        for rule in &self.combinations {
            if !rule.required.iter().all(|cap| remaining.contains(*cap)) {
                continue;
            }
            let claimed: Vec<&str> = rule
                .required
                .iter()
                .chain(rule.optional.iter().filter(|cap| remaining.contains(**cap)))
                .copied()
                .collect();
            bindings.push(binding(
                rule.kind,
                component_id,
                take(&mut remaining, &claimed),
            ));
        }

        for (capability, kind) in SINGLE_RULES {
            if !remaining.contains(*capability) || !self.is_enabled(*kind) {
                continue;
            }
            bindings.push(binding(*kind, component_id, take(&mut remaining, &[capability])));
        }

        if !remaining.is_empty() {
            tracing::debug!(
                component = %component_id,
                unassigned = ?remaining,
                "capabilities left unexposed"
            );
        }
        bindings
    }

    fn is_enabled(&self, kind: AdapterKind) -> bool {
        !self.config.disabled_adapters.contains(&kind)
    }

    fn claim_television(
        &self,
        component_id: &ComponentId,
        remaining: &mut BTreeSet<Capability>,
        meta: &DeviceMeta,
    ) -> Option<AdapterBinding> {
        if !self.config.television || !is_television(remaining, meta) {
            return None;
        }
        let eligible: Vec<&str> = TELEVISION_CAPABILITIES
            .iter()
            .copied()
            .filter(|cap| remaining.contains(*cap))
            .collect();
        if !eligible.contains(&"switch") {
            return None;
        }

        let mut bound = take(remaining, &eligible);
        if bound.contains(VENDOR_INPUT_SOURCE)
            && self.config.legacy_input_policy == LegacyInputPolicy::Drop
        {
            bound.remove(LEGACY_INPUT_SOURCE);
        }
        Some(binding(AdapterKind::Television, component_id, bound))
    }

    fn claim_speaker(
        &self,
        component_id: &ComponentId,
        remaining: &mut BTreeSet<Capability>,
    ) -> Option<AdapterBinding> {
        if !self.config.television_speaker
            || !component_id.is_main()
            || !remaining.contains(SPEAKER_REQUIRED)
        {
            return None;
        }
        let claimed: Vec<&str> = std::iter::once(SPEAKER_REQUIRED)
            .chain(
                SPEAKER_OPTIONAL
                    .iter()
                    .copied()
                    .filter(|cap| remaining.contains(*cap)),
            )
            .collect();
        Some(binding(
            AdapterKind::TelevisionSpeaker,
            component_id,
            take(remaining, &claimed),
        ))
    }
}

fn is_television(capabilities: &BTreeSet<Capability>, meta: &DeviceMeta) -> bool {
    if TELEVISION_CATEGORIES.iter().any(|c| meta.has_category(c)) {
        return true;
    }
    capabilities.contains("switch")
        && (capabilities.contains(VENDOR_INPUT_SOURCE) || capabilities.contains(LEGACY_INPUT_SOURCE))
        && capabilities.contains("tvChannel")
}

/// Remove `claimed` from `remaining`, returning the removed capabilities.
fn take(remaining: &mut BTreeSet<Capability>, claimed: &[&str]) -> BTreeSet<Capability> {
    claimed
        .iter()
        .filter_map(|cap| remaining.take(*cap))
        .collect()
}

fn binding(
    kind: AdapterKind,
    component_id: &ComponentId,
    capabilities: BTreeSet<Capability>,
) -> AdapterBinding {
    tracing::debug!(%kind, component = %component_id, ?capabilities, "adapter bound");
    AdapterBinding {
        kind,
        component_id: component_id.clone(),
        capabilities,
    }
}
