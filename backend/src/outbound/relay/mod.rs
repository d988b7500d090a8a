//! HTTP telemetry relay adapter used by `via_http` syncs.

mod http_relay;

pub use http_relay::HttpTelemetryRelay;
