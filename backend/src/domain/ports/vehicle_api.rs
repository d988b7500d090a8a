//! Port for the external vehicle API (fleet listing, telemetry, commands,
//! and the OAuth token endpoint).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::domain::{CommandName, TokenGrant, VehicleId, VehicleState};

use super::define_port_error;

define_port_error! {
    /// Errors raised by vehicle API adapters.
    pub enum VehicleApiError {
        /// Network or server failure.
        Transport { message: String } => "vehicle api transport failed: {message}",
        /// The call did not complete in time.
        Timeout { message: String } => "vehicle api timed out: {message}",
        /// The API throttled the caller.
        RateLimited { message: String } => "vehicle api rate limited: {message}",
        /// The API refused the request (bad token, unknown vehicle, bad grant).
        Rejected { message: String } => "vehicle api rejected request: {message}",
        /// The response body could not be decoded.
        Decode { message: String } => "vehicle api response invalid: {message}",
    }
}

/// Vehicle as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVehicle {
    /// Vehicle identifier.
    pub vehicle_id: VehicleId,
    /// Vehicle identification number.
    pub vin: Option<String>,
    /// Owner-assigned name.
    pub display_name: Option<String>,
    /// Connectivity state.
    pub state: VehicleState,
    /// Paint colour.
    pub color: Option<String>,
    /// Option codes string.
    pub option_codes: Option<String>,
    /// API version.
    pub api_version: Option<i32>,
    /// Whether the vehicle is in service.
    pub in_service: bool,
}

/// Drive-state telemetry as reported by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLocation {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Heading in degrees.
    pub heading: Option<i32>,
    /// Speed.
    pub speed: Option<f64>,
    /// Power draw.
    pub power: Option<f64>,
    /// Gear selector state.
    pub shift_state: Option<String>,
    /// GPS fix time.
    pub gps_as_of: Option<DateTime<Utc>>,
}

/// Vehicle response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    /// Whether the vehicle accepted the command.
    pub accepted: bool,
    /// Reason given when it did not.
    pub reason: Option<String>,
}

/// Port for vehicle API calls made with an account's bearer token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleApi: Send + Sync {
    /// List the vehicles visible to the credential.
    async fn list_vehicles(&self, access_token: &str)
    -> Result<Vec<RemoteVehicle>, VehicleApiError>;

    /// Fetch the current location; `None` when the vehicle reports no
    /// drive state.
    async fn fetch_location(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
    ) -> Result<Option<RemoteLocation>, VehicleApiError>;

    /// Ask the vehicle to wake up.
    async fn wake(&self, access_token: &str, vehicle_id: VehicleId) -> Result<(), VehicleApiError>;

    /// Send a remote command.
    async fn send_command(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
        command: &CommandName,
    ) -> Result<CommandAck, VehicleApiError>;

    /// Exchange a refresh token for a new grant.
    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, VehicleApiError>;

    /// Exchange the authorization code carried by `callback_url`.
    async fn exchange_code(
        &self,
        callback_url: &Url,
        code_verifier: &str,
    ) -> Result<TokenGrant, VehicleApiError>;
}
