//! DTOs for decoding vehicle API JSON responses.
//!
//! The adapter decodes into these transport DTOs first, then maps into port
//! records in one pass.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::ports::{CommandAck, RemoteLocation, RemoteVehicle};
use crate::domain::{TokenGrant, VehicleId, VehicleState};

/// `{"response": ...}` envelope used by every vehicle endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    pub(super) response: T,
}

#[derive(Debug, Deserialize)]
pub(super) struct VehicleDto {
    pub(super) id: i64,
    pub(super) vin: Option<String>,
    pub(super) display_name: Option<String>,
    #[serde(default)]
    pub(super) state: Option<String>,
    pub(super) color: Option<String>,
    pub(super) option_codes: Option<String>,
    pub(super) api_version: Option<i32>,
    #[serde(default)]
    pub(super) in_service: bool,
}

impl VehicleDto {
    pub(super) fn into_remote(self) -> RemoteVehicle {
        RemoteVehicle {
            vehicle_id: VehicleId::new(self.id),
            vin: self.vin,
            display_name: self.display_name,
            state: self
                .state
                .as_deref()
                .map_or(VehicleState::Unknown, VehicleState::parse),
            color: self.color,
            option_codes: self.option_codes,
            api_version: self.api_version,
            in_service: self.in_service,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VehicleDataDto {
    pub(super) drive_state: Option<DriveStateDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DriveStateDto {
    pub(super) latitude: Option<f64>,
    pub(super) longitude: Option<f64>,
    pub(super) heading: Option<i32>,
    pub(super) speed: Option<f64>,
    pub(super) power: Option<f64>,
    pub(super) shift_state: Option<String>,
    /// Unix seconds.
    pub(super) gps_as_of: Option<i64>,
}

impl VehicleDataDto {
    /// `None` when the vehicle reported no usable coordinates.
    pub(super) fn into_location(self) -> Result<Option<RemoteLocation>, String> {
        let Some(drive) = self.drive_state else {
            return Ok(None);
        };
        let (Some(latitude), Some(longitude)) = (drive.latitude, drive.longitude) else {
            return Ok(None);
        };
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err("drive state includes non-finite coordinates".to_owned());
        }
        Ok(Some(RemoteLocation {
            latitude,
            longitude,
            heading: drive.heading,
            speed: drive.speed,
            power: drive.power,
            shift_state: drive.shift_state,
            gps_as_of: drive
                .gps_as_of
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CommandResultDto {
    pub(super) result: bool,
    #[serde(default)]
    pub(super) reason: Option<String>,
}

impl CommandResultDto {
    pub(super) fn into_ack(self) -> CommandAck {
        CommandAck {
            accepted: self.result,
            reason: self.reason.filter(|reason| !reason.trim().is_empty()),
        }
    }
}

/// Form body posted to the OAuth token endpoint.
#[derive(Serialize)]
pub(super) struct TokenRequest<'a> {
    pub(super) grant_type: &'a str,
    pub(super) client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) redirect_uri: Option<&'a str>,
}

#[derive(Deserialize)]
pub(super) struct TokenResponseDto {
    pub(super) access_token: String,
    pub(super) refresh_token: Option<String>,
    pub(super) expires_in: i64,
}

impl TokenResponseDto {
    pub(super) fn into_grant(self) -> Result<TokenGrant, String> {
        if self.access_token.trim().is_empty() {
            return Err("token response carried an empty access token".to_owned());
        }
        let expires_in = TimeDelta::try_seconds(self.expires_in)
            .filter(|delta| *delta > TimeDelta::zero())
            .ok_or_else(|| {
                format!(
                    "token response expires_in {} is out of range",
                    self.expires_in
                )
            })?;
        Ok(TokenGrant {
            access_token: Zeroizing::new(self.access_token),
            refresh_token: self
                .refresh_token
                .filter(|token| !token.is_empty())
                .map(Zeroizing::new),
            expires_in,
        })
    }
}
