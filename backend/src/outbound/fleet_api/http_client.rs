//! Reqwest-backed vehicle API adapter.
//!
//! This adapter owns transport details only: URL building, bearer headers,
//! HTTP error mapping, and JSON decoding into port records. Per-call
//! deadlines are applied by the domain; the client timeout is a backstop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::dto::{
    CommandResultDto, Envelope, TokenRequest, TokenResponseDto, VehicleDataDto, VehicleDto,
};
use crate::domain::ports::{
    CommandAck, RemoteLocation, RemoteVehicle, VehicleApi, VehicleApiError,
};
use crate::domain::{CommandName, TokenGrant, VehicleId};
use crate::outbound::http_support::{is_timeout_status, status_message};

const DEFAULT_USER_AGENT: &str = "rental-core/0.1";

/// Endpoints and OAuth client identity for the vehicle API.
#[derive(Debug, Clone)]
pub struct FleetApiEndpoints {
    /// Base URL of the vehicle endpoints, e.g. `https://fleet-api.example.com/`.
    pub api_base: Url,
    /// OAuth token endpoint.
    pub token_url: Url,
    /// OAuth client identifier.
    pub client_id: String,
    /// Redirect URI registered for the authorization-code flow.
    pub redirect_uri: Option<String>,
}

/// Vehicle API adapter issuing HTTP requests with an account's bearer token.
pub struct HttpVehicleApi {
    client: Client,
    endpoints: FleetApiEndpoints,
}

impl HttpVehicleApi {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoints: FleetApiEndpoints, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, endpoints })
    }

    fn vehicle_url(&self, path: &str) -> Result<Url, VehicleApiError> {
        self.endpoints
            .api_base
            .join(path)
            .map_err(|err| {
                VehicleApiError::rejected(format!("invalid vehicle API path {path}: {err}"))
            })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, VehicleApiError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        decode(body.as_ref())
    }

    async fn token(&self, form: &TokenRequest<'_>) -> Result<TokenGrant, VehicleApiError> {
        let response: TokenResponseDto = self
            .call(self.client.post(self.endpoints.token_url.clone()).form(form))
            .await?;
        response.into_grant().map_err(VehicleApiError::decode)
    }
}

#[async_trait]
impl VehicleApi for HttpVehicleApi {
    async fn list_vehicles(
        &self,
        access_token: &str,
    ) -> Result<Vec<RemoteVehicle>, VehicleApiError> {
        let url = self.vehicle_url("api/1/vehicles")?;
        let envelope: Envelope<Vec<VehicleDto>> = self
            .call(self.client.get(url).bearer_auth(access_token))
            .await?;
        Ok(envelope
            .response
            .into_iter()
            .map(VehicleDto::into_remote)
            .collect())
    }

    async fn fetch_location(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
    ) -> Result<Option<RemoteLocation>, VehicleApiError> {
        let url = self.vehicle_url(&format!("api/1/vehicles/{vehicle_id}/vehicle_data"))?;
        let envelope: Envelope<VehicleDataDto> = self
            .call(
                self.client
                    .get(url)
                    .query(&[("endpoints", "location_data;drive_state")])
                    .bearer_auth(access_token),
            )
            .await?;
        envelope
            .response
            .into_location()
            .map_err(VehicleApiError::decode)
    }

    async fn wake(&self, access_token: &str, vehicle_id: VehicleId) -> Result<(), VehicleApiError> {
        let url = self.vehicle_url(&format!("api/1/vehicles/{vehicle_id}/wake_up"))?;
        let _: Envelope<serde_json::Value> = self
            .call(self.client.post(url).bearer_auth(access_token))
            .await?;
        Ok(())
    }

    async fn send_command(
        &self,
        access_token: &str,
        vehicle_id: VehicleId,
        command: &CommandName,
    ) -> Result<CommandAck, VehicleApiError> {
        let endpoint = command_endpoint(command);
        let url = self.vehicle_url(&format!("api/1/vehicles/{vehicle_id}/command/{endpoint}"))?;
        let envelope: Envelope<CommandResultDto> = self
            .call(self.client.post(url).bearer_auth(access_token))
            .await?;
        Ok(envelope.response.into_ack())
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, VehicleApiError> {
        self.token(&TokenRequest {
            grant_type: "refresh_token",
            client_id: &self.endpoints.client_id,
            refresh_token: Some(refresh_token),
            code: None,
            code_verifier: None,
            redirect_uri: None,
        })
        .await
    }

    async fn exchange_code(
        &self,
        callback_url: &Url,
        code_verifier: &str,
    ) -> Result<TokenGrant, VehicleApiError> {
        let code = authorization_code(callback_url)?;
        self.token(&TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.endpoints.client_id,
            refresh_token: None,
            code: Some(&code),
            code_verifier: Some(code_verifier),
            redirect_uri: self.endpoints.redirect_uri.as_deref(),
        })
        .await
    }
}

/// Vehicle endpoint name for a rental command.
fn command_endpoint(command: &CommandName) -> &str {
    match command.as_ref() {
        "unlock" => "door_unlock",
        "lock" => "door_lock",
        other => other,
    }
}

fn authorization_code(callback_url: &Url) -> Result<String, VehicleApiError> {
    let mut code = None;
    for (key, value) in callback_url.query_pairs() {
        match key.as_ref() {
            "error" => {
                return Err(VehicleApiError::rejected(format!(
                    "authorization denied: {value}"
                )));
            }
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.ok_or_else(|| VehicleApiError::rejected("callback URL carries no authorization code"))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, VehicleApiError> {
    serde_json::from_slice(body).map_err(|error| {
        VehicleApiError::decode(format!("invalid vehicle API JSON payload: {error}"))
    })
}

fn map_transport_error(error: reqwest::Error) -> VehicleApiError {
    if error.is_timeout() {
        VehicleApiError::timeout(error.to_string())
    } else {
        VehicleApiError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> VehicleApiError {
    let message = status_message(status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => VehicleApiError::rate_limited(message),
        _ if is_timeout_status(status) => VehicleApiError::timeout(message),
        _ if status.is_client_error() => VehicleApiError::rejected(message),
        _ => VehicleApiError::transport(message),
    }
}
