//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod authorized_gateway;
pub mod capability_resolver;
pub mod crash_loop;
pub mod device_synchronizer;
pub mod discovery;
pub mod event_router;
pub mod token_store;
