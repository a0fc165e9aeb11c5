//! Adapter port: protocol-facing units hosted by a device synchronizer.
//!
//! An adapter is bound to exactly one component and a fixed capability subset
//! when it is built. It never talks to the remote platform directly: it reads
//! the synchronizer's cached snapshot and issues commands through
//! [`DeviceSynchronizer::send_commands`].

use std::sync::{Arc, Weak};

use capbridge_domain::adapter::AdapterBinding;
use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::ComponentStatus;

use crate::services::device_synchronizer::DeviceSynchronizer;

/// A protocol-facing adapter.
///
/// Notifications are synchronous and must not block: they update the
/// adapter's own view, nothing more.
pub trait Adapter: Send + Sync {
    /// Kind, component and owned capabilities.
    fn binding(&self) -> &AdapterBinding;

    /// A new status snapshot was fetched. `status` is `None` when the
    /// snapshot carries nothing for this adapter's component.
    fn on_status(&self, status: Option<&ComponentStatus>);

    /// A pushed change for one of this adapter's capabilities.
    fn process_event(&self, event: &DeviceEvent);

    /// The device became unreachable (`false`) or reachable again (`true`).
    fn set_reachable(&self, reachable: bool);
}

/// Everything an adapter is constructed with.
pub struct AdapterContext<G> {
    pub binding: AdapterBinding,
    pub device_id: DeviceId,
    pub device_name: String,
    synchronizer: Weak<DeviceSynchronizer<G>>,
}

impl<G> AdapterContext<G> {
    #[must_use]
    pub fn new(
        binding: AdapterBinding,
        device_id: DeviceId,
        device_name: String,
        synchronizer: Weak<DeviceSynchronizer<G>>,
    ) -> Self {
        Self {
            binding,
            device_id,
            device_name,
            synchronizer,
        }
    }

    /// Handle to the owning synchronizer.
    #[must_use]
    pub fn synchronizer(&self) -> Weak<DeviceSynchronizer<G>> {
        Weak::clone(&self.synchronizer)
    }

    /// Last cached status of the bound component, without fetching.
    #[must_use]
    pub fn component_snapshot(&self) -> Option<ComponentStatus> {
        let sync = self.synchronizer.upgrade()?;
        sync.cached_snapshot()?
            .component(self.binding.component_id.as_str())
            .cloned()
    }
}

/// Builds adapters from resolver output. Called once per binding at
/// registration time.
pub trait AdapterFactory<G>: Send + Sync {
    fn build(&self, context: AdapterContext<G>) -> Arc<dyn Adapter>;
}
