//! Reqwest-backed telemetry relay.
//!
//! The relay is the service's own vehicle HTTP surface: it lists vehicles and
//! fetches and stores a location when asked. Only the outcome is decoded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::VehicleId;
use crate::domain::ports::{RelayRefresh, TelemetryRelay, TelemetryRelayError};
use crate::outbound::http_support::{is_timeout_status, status_message};

#[derive(Debug, Deserialize)]
struct VehicleListDto {
    #[serde(default)]
    vehicles: Vec<RelayVehicleDto>,
}

#[derive(Debug, Deserialize)]
struct RelayVehicleDto {
    vehicle_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LocationRefreshDto {
    #[serde(default)]
    success: bool,
}

/// Telemetry relay reached over HTTP.
pub struct HttpTelemetryRelay {
    client: Client,
    base_url: Url,
}

impl HttpTelemetryRelay {
    /// Build a relay client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TelemetryRelayError> {
        let url = self.base_url.join(path).map_err(|err| {
            TelemetryRelayError::rejected(format!("invalid relay path {path}: {err}"))
        })?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        serde_json::from_slice(body.as_ref()).map_err(|error| {
            TelemetryRelayError::decode(format!("invalid relay JSON payload: {error}"))
        })
    }
}

#[async_trait]
impl TelemetryRelay for HttpTelemetryRelay {
    async fn list_vehicles(&self) -> Result<Vec<VehicleId>, TelemetryRelayError> {
        let listing: VehicleListDto = self.get("api/vehicles").await?;
        Ok(vehicle_ids(listing))
    }

    async fn refresh_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<RelayRefresh, TelemetryRelayError> {
        let outcome: LocationRefreshDto = self
            .get(&format!("api/vehicles/{vehicle_id}/location"))
            .await?;
        Ok(RelayRefresh {
            location_updated: outcome.success,
        })
    }
}

/// Listed vehicles without an id are skipped.
fn vehicle_ids(listing: VehicleListDto) -> Vec<VehicleId> {
    listing
        .vehicles
        .into_iter()
        .filter_map(|vehicle| vehicle.vehicle_id.map(VehicleId::new))
        .collect()
}

fn map_transport_error(error: reqwest::Error) -> TelemetryRelayError {
    if error.is_timeout() {
        TelemetryRelayError::timeout(error.to_string())
    } else {
        TelemetryRelayError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> TelemetryRelayError {
    let message = status_message(status, body);
    if is_timeout_status(status) {
        TelemetryRelayError::timeout(message)
    } else if status.is_client_error() {
        TelemetryRelayError::rejected(message)
    } else {
        TelemetryRelayError::transport(message)
    }
}
