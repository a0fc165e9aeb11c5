//! Accessory: cached characteristics for one bound component.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use capbridge_app::ports::{Adapter, AdapterContext, DeviceGateway};
use capbridge_app::services::device_synchronizer::DeviceSynchronizer;
use capbridge_domain::adapter::{AdapterBinding, AdapterKind};
use capbridge_domain::capability::Capability;
use capbridge_domain::command::Command;
use capbridge_domain::error::{BridgeError, ValidationError};
use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::ComponentStatus;

type Characteristics = BTreeMap<(String, String), serde_json::Value>;

/// Protocol-facing view of one component capability subset.
pub struct AccessoryAdapter<G> {
    binding: AdapterBinding,
    device_id: DeviceId,
    name: String,
    synchronizer: Weak<DeviceSynchronizer<G>>,
    characteristics: Mutex<Characteristics>,
    reachable: AtomicBool,
}

impl<G> AccessoryAdapter<G> {
    /// Build from the context handed out by the synchronizer. Components
    /// other than `main` get their id appended to the display name.
    #[must_use]
    pub fn from_context(context: AdapterContext<G>) -> Self {
        let name = if context.binding.component_id.is_main() {
            context.device_name.clone()
        } else {
            format!("{} {}", context.device_name, context.binding.component_id)
        };
        Self {
            synchronizer: context.synchronizer(),
            binding: context.binding,
            device_id: context.device_id,
            name,
            characteristics: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn kind(&self) -> AdapterKind {
        self.binding.kind
    }

    #[must_use]
    pub fn service_name(&self) -> &'static str {
        self.binding.kind.service_name()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Cached value, without touching the synchronizer.
    #[must_use]
    pub fn characteristic(&self, capability: &str, attribute: &str) -> Option<serde_json::Value> {
        self.lock()
            .get(&(capability.to_string(), attribute.to_string()))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Characteristics> {
        self.characteristics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_usable(&self, capability: &str) -> Result<(), BridgeError> {
        if !self.binding.owns(capability) {
            return Err(ValidationError::UnboundCapability(capability.to_string()).into());
        }
        if !self.is_reachable() {
            return Err(BridgeError::Unreachable(self.device_id));
        }
        Ok(())
    }
}

impl<G: DeviceGateway + 'static> AccessoryAdapter<G> {
    /// Current value of `capability.attribute`.
    ///
    /// Refreshes through the synchronizer first, which answers from its
    /// cache while the snapshot is fresh.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a capability this accessory does not
    /// own, [`BridgeError::Unreachable`] while the device is offline, or the
    /// status fetch failure.
    #[tracing::instrument(skip(self), fields(device_id = %self.device_id, kind = %self.binding.kind))]
    pub async fn read(
        &self,
        capability: &str,
        attribute: &str,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        self.ensure_usable(capability)?;
        let synchronizer = self
            .synchronizer
            .upgrade()
            .ok_or(BridgeError::Unreachable(self.device_id))?;
        let snapshot = synchronizer.refresh_status(false).await?;
        Ok(self.characteristic(capability, attribute).or_else(|| {
            snapshot
                .component(self.binding.component_id.as_str())?
                .value(capability, attribute)
                .cloned()
        }))
    }

    /// Send `capability.command(arguments)` to the bound component.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a capability this accessory does not
    /// own, [`BridgeError::Unreachable`] while the device is offline, or
    /// [`BridgeError::CommandFailed`].
    #[tracing::instrument(skip(self, arguments), fields(device_id = %self.device_id, kind = %self.binding.kind))]
    pub async fn write(
        &self,
        capability: &str,
        command: &str,
        arguments: Vec<serde_json::Value>,
    ) -> Result<(), BridgeError> {
        self.ensure_usable(capability)?;
        let synchronizer = self
            .synchronizer
            .upgrade()
            .ok_or(BridgeError::Unreachable(self.device_id))?;
        let mut command = Command::new(Capability::new(capability)?, command)
            .on_component(self.binding.component_id.clone());
        command.arguments = arguments;
        synchronizer.send_commands(&[command]).await
    }
}

impl<G: DeviceGateway + 'static> Adapter for AccessoryAdapter<G> {
    fn binding(&self) -> &AdapterBinding {
        &self.binding
    }

    fn on_status(&self, status: Option<&ComponentStatus>) {
        let Some(status) = status else {
            tracing::trace!(name = %self.name, "snapshot has no data for component");
            return;
        };
        let mut characteristics = self.lock();
        characteristics.clear();
        for capability in &self.binding.capabilities {
            for attribute in status.attributes(capability.as_str()) {
                if let Some(value) = status.value(capability.as_str(), attribute) {
                    characteristics.insert(
                        (capability.to_string(), attribute.to_string()),
                        value.clone(),
                    );
                }
            }
        }
    }

    fn process_event(&self, event: &DeviceEvent) {
        let key = (event.capability.to_string(), event.attribute.clone());
        let mut characteristics = self.lock();
        if event.value.is_null() {
            characteristics.remove(&key);
        } else {
            characteristics.insert(key, event.value.clone());
        }
    }

    fn set_reachable(&self, reachable: bool) {
        if self.reachable.swap(reachable, Ordering::AcqRel) != reachable {
            tracing::info!(name = %self.name, service = self.service_name(), reachable, "accessory reachability changed");
        }
    }
}
