//! Factory handed to the synchronizer; keeps every accessory it built.

use std::sync::{Arc, Mutex, PoisonError};

use capbridge_app::ports::{Adapter, AdapterContext, AdapterFactory, DeviceGateway};

use crate::accessory::AccessoryAdapter;

/// Builds an [`AccessoryAdapter`] per binding and keeps a handle on each so
/// the protocol side can enumerate what is published.
pub struct AccessoryFactory<G> {
    built: Mutex<Vec<Arc<AccessoryAdapter<G>>>>,
}

impl<G> Default for AccessoryFactory<G> {
    fn default() -> Self {
        Self {
            built: Mutex::new(Vec::new()),
        }
    }
}

impl<G> AccessoryFactory<G> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accessory built so far, in build order.
    #[must_use]
    pub fn accessories(&self) -> Vec<Arc<AccessoryAdapter<G>>> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<G: DeviceGateway + 'static> AdapterFactory<G> for AccessoryFactory<G> {
    fn build(&self, context: AdapterContext<G>) -> Arc<dyn Adapter> {
        let accessory = Arc::new(AccessoryAdapter::from_context(context));
        tracing::debug!(
            name = accessory.name(),
            service = accessory.service_name(),
            "accessory built"
        );
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&accessory));
        accessory
    }
}
