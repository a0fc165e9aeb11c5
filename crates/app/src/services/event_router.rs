//! Event router: pushed device events to the owning synchronizer.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;

use crate::ports::{DeviceGateway, EventSink};
use crate::services::device_synchronizer::DeviceSynchronizer;

/// Registry of synchronizers by device id.
///
/// Starts empty so the inbound channel can accept traffic before discovery
/// finishes; events for unknown devices are dropped.
pub struct EventRouter<G> {
    devices: RwLock<HashMap<DeviceId, Arc<DeviceSynchronizer<G>>>>,
}

impl<G> Default for EventRouter<G> {
    fn default() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }
}

impl<G: DeviceGateway + 'static> EventRouter<G> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a device.
    pub fn register(&self, synchronizer: Arc<DeviceSynchronizer<G>>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.insert(synchronizer.device_id(), synchronizer);
    }

    #[must_use]
    pub fn get(&self, device_id: DeviceId) -> Option<Arc<DeviceSynchronizer<G>>> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(&device_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route one event. Returns `true` when an adapter consumed it.
    #[tracing::instrument(skip_all, fields(device_id = %event.device_id, capability = %event.capability))]
    pub fn route(&self, event: &DeviceEvent) -> bool {
        match self.get(event.device_id) {
            Some(synchronizer) => synchronizer.process_event(event),
            None => {
                tracing::debug!("event for unregistered device dropped");
                false
            }
        }
    }
}

impl<G: DeviceGateway + 'static> EventSink for EventRouter<G> {
    fn dispatch(&self, event: &DeviceEvent) -> bool {
        self.route(event)
    }
}
