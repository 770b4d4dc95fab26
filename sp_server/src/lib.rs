//! HTTP API server for the StayPort booking and wallet engine.
//!
//! The binary in `main.rs` wires configuration, logging and the store
//! backend together; everything reusable (router construction, auth,
//! config parsing) lives here so the integration tests can drive the full
//! router in-process.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
