//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod adapter;
pub mod inbound;
pub mod platform;
pub mod reauth;
pub mod storage;

pub use adapter::{Adapter, AdapterContext, AdapterFactory};
pub use inbound::{AuthorizationHandler, EventSink};
pub use platform::{DeviceGateway, PlatformApi};
pub use reauth::{ReauthReason, Reauthenticator};
pub use storage::{CrashRepository, TokenRepository};
