//! # capbridge-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `PlatformApi`: remote device platform (discovery, status, health,
//!     commands, OAuth token exchange)
//!   - `TokenRepository` / `CrashRepository`: durable token and crash records
//!   - `Reauthenticator`: the full re-authorization entry point
//!   - `Adapter` / `AdapterFactory`: protocol-facing adapters hosted by a
//!     device synchronizer
//! - Define **driving/inbound ports** used by the push channel:
//!   - `AuthorizationHandler`: OAuth authorization-code callback
//!   - `EventSink`: pushed device-change events
//! - Provide the use-case services:
//!   - `CapabilityResolver`: greedy capability-to-adapter composition
//!   - `DeviceSynchronizer`: per-device status cache, command serialization,
//!     polling and online/offline state machine
//!   - `TokenStore`: token lifecycle, refresh monitor, reactive 401 handling
//!   - `CrashLoopManager`: persisted failure window and destructive recovery
//!   - `EventRouter`: pushed events to the bound adapter
//!   - `DiscoveryService`: startup discovery with bounded backoff
//!
//! ## Dependency rule
//! Depends on `capbridge-domain` only (plus `tokio::sync`/`tokio::time`).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;
