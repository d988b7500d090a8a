//! Outbound adapters implementing the domain ports.
//!
//! - `memory`: in-process repositories for tests and single-node runs.
//! - `persistence`: PostgreSQL repositories via Diesel.
//! - `fleet_api`: the vehicle API over HTTP.
//! - `relay`: the telemetry relay over HTTP.

pub mod fleet_api;
pub(crate) mod http_support;
pub mod memory;
pub mod persistence;
pub mod relay;
