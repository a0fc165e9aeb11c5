//! # capbridge-adapter-http-axum
//!
//! Inbound push channel built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Receive the **OAuth authorization code** on `/oauth/callback` and hand
//!   it to the token store
//! - Receive **platform webhooks** on `/events`: answer the `PING`
//!   verification handshake and route `EVENT` payloads to device adapters
//! - Expose `/health` for liveness probes
//!
//! ## Dependency rule
//! Depends on `capbridge-app` (for the inbound port traits) and
//! `capbridge-domain` (for the event type). Never leaks axum types into the
//! domain.

pub mod error;
pub mod oauth;
pub mod router;
pub mod state;
pub mod webhook;
