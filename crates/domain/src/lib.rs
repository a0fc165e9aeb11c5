//! # capbridge-domain
//!
//! Pure domain model for the capbridge cloud-to-accessory bridge.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **Adapter kinds** and the bindings capability composition yields
//! - Define **Devices** and their **Components** (sub-addressable units that
//!   each declare a set of **Capabilities**)
//! - Define **Commands** (batched remote instructions) and **Status snapshots**
//!   (last-known state of every component of a device)
//! - Define **Device events** (pushed change notifications)
//! - Define the **Token record** (OAuth access/refresh pair and expiry rules)
//! - Define **Crash records** (rolling window of process-level failures)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod adapter;
pub mod capability;
pub mod command;
pub mod crash;
pub mod device;
pub mod event;
pub mod status;
pub mod token;
