//! # capbridge-adapter-accessory
//!
//! Generic accessory adapter: one instance per resolved
//! [`AdapterBinding`](capbridge_domain::adapter::AdapterBinding).
//!
//! ## Behaviour
//!
//! | Trigger | Effect |
//! |---------|--------|
//! | New status snapshot | Characteristics of the owned capabilities are replaced |
//! | Pushed event | The single characteristic is updated, `null` clears it |
//! | Device unreachable | Reads and writes fail fast until it recovers |
//! | `read` | Served from the synchronizer's cache, fetched if stale |
//! | `write` | Sent as a one-command batch through the synchronizer |
//!
//! ## Dependency rule
//!
//! Depends on `capbridge-app` (port traits, synchronizer) and
//! `capbridge-domain` only.

mod accessory;
mod factory;

pub use accessory::AccessoryAdapter;
pub use factory::AccessoryFactory;
