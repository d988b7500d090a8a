//! Vehicle API outbound adapter.
//!
//! A thin `reqwest` implementation of the `VehicleApi` port: fleet listing,
//! drive-state telemetry, wake and command calls, plus the OAuth token
//! endpoint used for refresh and code exchange.

mod dto;
mod http_client;

pub use http_client::{FleetApiEndpoints, HttpVehicleApi};
