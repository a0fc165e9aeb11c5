//! # capbridge-adapter-platform-reqwest
//!
//! Driven adapter for the remote device platform, built on
//! [reqwest](https://docs.rs/reqwest).
//!
//! ## Responsibilities
//! - Implement the `PlatformApi` port: locations, devices, per-device status,
//!   health and command batches
//! - Exchange authorization codes and refresh tokens at the OAuth token
//!   endpoint
//! - Build the authorization URL a user visits to grant access
//! - Map transport and HTTP failures onto [`ApiError`](capbridge_domain::error::ApiError),
//!   with `401` always surfacing as `Unauthorized`
//!
//! ## Dependency rule
//! Depends on `capbridge-app` (for the port trait) and `capbridge-domain`.
//! Wire DTOs never leave this crate.

mod client;
mod config;
mod dto;
mod error;

pub use client::PlatformClient;
pub use config::PlatformConfig;
pub use error::PlatformError;
