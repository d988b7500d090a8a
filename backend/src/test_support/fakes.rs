//! Scriptable upstream doubles for tests that cannot use `mockall`.
//!
//! Integration tests link against the library without `cfg(test)`, so the
//! generated mocks are unavailable there. These fakes hold their script in a
//! mutex and record what they were asked to do.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::TimeDelta;
use url::Url;
use zeroize::Zeroizing;

use crate::domain::ports::{
    CommandAck, RelayRefresh, RemoteLocation, RemoteVehicle, TelemetryRelay, TelemetryRelayError,
    VehicleApi, VehicleApiError,
};
use crate::domain::{CommandName, TokenGrant, VehicleId, VehicleState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("fake state mutex"),
    }
}

/// Listed vehicle with sensible defaults.
pub fn remote_vehicle(id: i64, state: VehicleState) -> RemoteVehicle {
    RemoteVehicle {
        vehicle_id: VehicleId::new(id),
        vin: Some(format!("5YJ3E1EA0000{id:05}")),
        display_name: Some(format!("Car {id}")),
        state,
        color: None,
        option_codes: None,
        api_version: Some(67),
        in_service: false,
    }
}

/// Location sample at the given coordinates.
pub fn remote_location(latitude: f64, longitude: f64) -> RemoteLocation {
    RemoteLocation {
        latitude,
        longitude,
        heading: Some(90),
        speed: None,
        power: Some(0.0),
        shift_state: Some("P".to_owned()),
        gps_as_of: None,
    }
}

/// Grant returned by the fake token endpoint.
pub fn grant(access: &str, refresh: Option<&str>, expires_in: TimeDelta) -> TokenGrant {
    TokenGrant {
        access_token: Zeroizing::new(access.to_owned()),
        refresh_token: refresh.map(|token| Zeroizing::new(token.to_owned())),
        expires_in,
    }
}

#[derive(Default)]
struct VehicleScript {
    vehicles: Vec<RemoteVehicle>,
    locations: HashMap<VehicleId, Result<Option<RemoteLocation>, VehicleApiError>>,
    wake_failures: HashSet<VehicleId>,
    list_failure: Option<VehicleApiError>,
    refusal: Option<String>,
    token_grant: Option<Result<TokenGrant, VehicleApiError>>,
    wakes: Vec<VehicleId>,
    commands: Vec<(VehicleId, CommandName)>,
    bearer_tokens: Vec<String>,
    refresh_tokens: Vec<String>,
    exchanged: Vec<(Url, String)>,
}

/// Vehicle API double driven by an in-memory script.
///
/// Unscripted locations read as "no drive state", commands are accepted, and
/// token calls fail as rejected until a grant is scripted.
#[derive(Default)]
pub struct FakeVehicleApi {
    script: Mutex<VehicleScript>,
}

impl FakeVehicleApi {
    /// Create an empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vehicle to the fleet listing.
    pub fn with_vehicle(self, vehicle: RemoteVehicle) -> Self {
        lock(&self.script).vehicles.push(vehicle);
        self
    }

    /// Script the location reported for `vehicle_id`.
    pub fn with_location(self, vehicle_id: VehicleId, location: RemoteLocation) -> Self {
        lock(&self.script)
            .locations
            .insert(vehicle_id, Ok(Some(location)));
        self
    }

    /// Make location reads for `vehicle_id` fail.
    pub fn with_location_failure(self, vehicle_id: VehicleId, error: VehicleApiError) -> Self {
        lock(&self.script).locations.insert(vehicle_id, Err(error));
        self
    }

    /// Make wake requests for `vehicle_id` fail.
    pub fn with_wake_failure(self, vehicle_id: VehicleId) -> Self {
        lock(&self.script).wake_failures.insert(vehicle_id);
        self
    }

    /// Make the fleet listing fail.
    pub fn with_list_failure(self, error: VehicleApiError) -> Self {
        lock(&self.script).list_failure = Some(error);
        self
    }

    /// Have vehicles refuse every command with `reason`.
    pub fn refusing_commands(self, reason: &str) -> Self {
        lock(&self.script).refusal = Some(reason.to_owned());
        self
    }

    /// Script the outcome of refresh and code-exchange calls.
    pub fn with_token_response(self, response: Result<TokenGrant, VehicleApiError>) -> Self {
        lock(&self.script).token_grant = Some(response);
        self
    }

    /// Vehicles woken so far.
    pub fn wakes(&self) -> Vec<VehicleId> {
        lock(&self.script).wakes.clone()
    }

    /// Commands sent so far.
    pub fn commands(&self) -> Vec<(VehicleId, CommandName)> {
        lock(&self.script).commands.clone()
    }

    /// Bearer tokens presented on vehicle calls.
    pub fn bearer_tokens(&self) -> Vec<String> {
        lock(&self.script).bearer_tokens.clone()
    }

    /// Refresh tokens presented to the token endpoint.
    pub fn refresh_tokens(&self) -> Vec<String> {
        lock(&self.script).refresh_tokens.clone()
    }

    /// Callback URLs and verifiers presented for code exchange.
    pub fn exchanged(&self) -> Vec<(Url, String)> {
        lock(&self.script).exchanged.clone()
    }

    fn token_response(script: &VehicleScript) -> Result<TokenGrant, VehicleApiError> {
        script
            .token_grant
            .clone()
            .unwrap_or_else(|| Err(VehicleApiError::rejected("no grant scripted")))
    }
}

#[async_trait]
impl VehicleApi for FakeVehicleApi {
    async fn list_vehicles(
        &self,
        access_token: &str,
    ) -> Result<Vec<RemoteVehicle>, VehicleApiError> {
        let mut script = lock(&self.script);
        script.bearer_tokens.push(access_token.to_owned());
        match &script.list_failure {
            Some(error) => Err(error.clone()),
            None => Ok(script.vehicles.clone()),
        }
    }

    async fn fetch_location(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
    ) -> Result<Option<RemoteLocation>, VehicleApiError> {
        let mut script = lock(&self.script);
        script.bearer_tokens.push(access_token.to_owned());
        script.locations.get(&vehicle_id).cloned().unwrap_or(Ok(None))
    }

    async fn wake(&self, access_token: &str, vehicle_id: VehicleId) -> Result<(), VehicleApiError> {
        let mut script = lock(&self.script);
        script.bearer_tokens.push(access_token.to_owned());
        script.wakes.push(vehicle_id);
        if script.wake_failures.contains(&vehicle_id) {
            return Err(VehicleApiError::timeout(format!("vehicle {vehicle_id} stayed asleep")));
        }
        Ok(())
    }

    async fn send_command(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
        command: &CommandName,
    ) -> Result<CommandAck, VehicleApiError> {
        let mut script = lock(&self.script);
        script.bearer_tokens.push(access_token.to_owned());
        script.commands.push((vehicle_id, command.clone()));
        Ok(match &script.refusal {
            Some(reason) => CommandAck {
                accepted: false,
                reason: Some(reason.clone()),
            },
            None => CommandAck {
                accepted: true,
                reason: None,
            },
        })
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, VehicleApiError> {
        let mut script = lock(&self.script);
        script.refresh_tokens.push(refresh_token.to_owned());
        Self::token_response(&script)
    }

    async fn exchange_code(
        &self,
        callback_url: &Url,
        code_verifier: &str,
    ) -> Result<TokenGrant, VehicleApiError> {
        let mut script = lock(&self.script);
        script
            .exchanged
            .push((callback_url.clone(), code_verifier.to_owned()));
        Self::token_response(&script)
    }
}

#[derive(Default)]
struct RelayScript {
    vehicles: Vec<VehicleId>,
    outcomes: HashMap<VehicleId, Result<RelayRefresh, TelemetryRelayError>>,
    refreshed: Vec<VehicleId>,
}

/// Telemetry relay double; unscripted refreshes report an update.
#[derive(Default)]
pub struct FakeTelemetryRelay {
    script: Mutex<RelayScript>,
}

impl FakeTelemetryRelay {
    /// Create a relay listing `vehicles`.
    pub fn listing(vehicles: impl IntoIterator<Item = i64>) -> Self {
        let relay = Self::default();
        lock(&relay.script).vehicles = vehicles.into_iter().map(VehicleId::new).collect();
        relay
    }

    /// Script the refresh outcome for `vehicle_id`.
    pub fn with_outcome(
        self,
        vehicle_id: i64,
        outcome: Result<RelayRefresh, TelemetryRelayError>,
    ) -> Self {
        lock(&self.script)
            .outcomes
            .insert(VehicleId::new(vehicle_id), outcome);
        self
    }

    /// Vehicles refreshed so far, in call order.
    pub fn refreshed(&self) -> Vec<VehicleId> {
        lock(&self.script).refreshed.clone()
    }
}

#[async_trait]
impl TelemetryRelay for FakeTelemetryRelay {
    async fn list_vehicles(&self) -> Result<Vec<VehicleId>, TelemetryRelayError> {
        Ok(lock(&self.script).vehicles.clone())
    }

    async fn refresh_location(
        &self,
        vehicle_id: VehicleId,
    ) -> Result<RelayRefresh, TelemetryRelayError> {
        let mut script = lock(&self.script);
        script.refreshed.push(vehicle_id);
        script.outcomes.get(&vehicle_id).cloned().unwrap_or(Ok(RelayRefresh {
            location_updated: true,
        }))
    }
}
