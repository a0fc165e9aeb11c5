//! Inbound ports: what the push channel drives.

use std::future::Future;
use std::sync::Arc;

use capbridge_domain::error::BridgeError;
use capbridge_domain::event::DeviceEvent;

/// Completes the OAuth flow with the code delivered to the callback URL.
pub trait AuthorizationHandler: Send + Sync {
    fn complete_authorization(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: AuthorizationHandler> AuthorizationHandler for Arc<T> {
    fn complete_authorization(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).complete_authorization(code)
    }
}

/// Accepts pushed device-change events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Returns `true` when an adapter consumed it.
    fn dispatch(&self, event: &DeviceEvent) -> bool;
}

impl<T: EventSink> EventSink for Arc<T> {
    fn dispatch(&self, event: &DeviceEvent) -> bool {
        (**self).dispatch(event)
    }
}
