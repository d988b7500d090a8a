//! Rental core: leases, OAuth handshakes, vehicle credentials, and the
//! vehicle telemetry cache with its background sync.

pub mod domain;
pub mod outbound;
pub mod settings;
pub mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
