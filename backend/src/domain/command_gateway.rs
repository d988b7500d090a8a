//! Request-path composition for renting vehicles and issuing commands.
//!
//! Every call starts from a caller identity token. The token is verified with
//! the identity provider; the verified account is the lease key.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Serialize;
use tracing::{info, warn};

use super::ports::{IdentityProvider, IdentityProviderError, VehicleApi, VehicleApiError};
use super::runtime::with_deadline;
use super::upstream::{map_identity_error, map_vehicle_api_error};
use super::{AccountId, CommandName, Error, Lease, LeaseManager, LeaseStart, TokenStore, VehicleId};

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Account whose credential drives the vehicles.
    pub fleet_account: AccountId,
    /// Deadline for each identity and vehicle API call.
    pub call_timeout: Duration,
    /// Authorize commands without contacting the vehicle.
    pub dry_run: bool,
}

impl GatewayConfig {
    /// Defaults for vehicles driven by `fleet_account`.
    pub fn for_account(fleet_account: AccountId) -> Self {
        Self {
            fleet_account,
            call_timeout: Duration::from_secs(30),
            dry_run: false,
        }
    }
}

/// Result of a command that passed authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Caller account.
    pub account: AccountId,
    /// Leased vehicle the command went to.
    pub vehicle_id: VehicleId,
    /// Command issued.
    pub command: CommandName,
    /// Whether the vehicle accepted the command.
    pub accepted: bool,
    /// Reason reported by the vehicle when it refused.
    pub reason: Option<String>,
    /// True when the command was authorized but not sent.
    pub simulated: bool,
}

/// Driven ports used by the gateway.
#[derive(Clone)]
pub struct GatewayPorts {
    /// Identity token verification.
    pub identity: Arc<dyn IdentityProvider>,
    /// Vehicle API used for wake and command calls.
    pub vehicle_api: Arc<dyn VehicleApi>,
}

/// Lease-checked entry point for remote vehicle commands.
#[derive(Clone)]
pub struct VehicleCommandGateway {
    ports: GatewayPorts,
    leases: LeaseManager,
    tokens: TokenStore,
    config: GatewayConfig,
}

impl VehicleCommandGateway {
    /// Create a gateway.
    pub fn new(
        ports: GatewayPorts,
        leases: LeaseManager,
        tokens: TokenStore,
        config: GatewayConfig,
    ) -> Self {
        Self {
            ports,
            leases,
            tokens,
            config,
        }
    }

    /// Start a lease for the caller, using the default duration when
    /// `duration` is `None`.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a rejected token; otherwise as for
    /// [`LeaseManager::start`].
    pub async fn rent(
        &self,
        identity_token: &str,
        vehicle_id: VehicleId,
        duration: Option<TimeDelta>,
    ) -> Result<LeaseStart, Error> {
        let account = self.verify(identity_token).await?;
        let duration = duration.unwrap_or(self.leases.policy().default_duration);
        self.leases.start(&account, vehicle_id, duration).await
    }

    /// Lease currently held by the caller.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a rejected token; `StorageUnavailable` when the
    /// lease cannot be read.
    pub async fn status(&self, identity_token: &str) -> Result<Option<Lease>, Error> {
        let account = self.verify(identity_token).await?;
        self.leases.status(&account).await
    }

    /// End the caller's lease; returns whether one was held.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for a rejected token; `StorageUnavailable` when the
    /// lease cannot be removed.
    pub async fn release(&self, identity_token: &str) -> Result<bool, Error> {
        let account = self.verify(identity_token).await?;
        self.leases.end(&account).await
    }

    /// Verify the caller, authorize `command` against their lease and send it
    /// to the leased vehicle.
    ///
    /// A failed wake request is logged and the command is sent anyway.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed command name.
    /// - `Unauthenticated` for a rejected identity token.
    /// - `Denied` with the lease reason.
    /// - `NotFound`/`UpstreamTimeout`/`UpstreamRejected` when no usable fleet
    ///   credential exists or the vehicle API fails.
    pub async fn execute(
        &self,
        identity_token: &str,
        command: &str,
    ) -> Result<CommandOutcome, Error> {
        let command =
            CommandName::new(command).map_err(|err| Error::invalid_argument(err.to_string()))?;
        let account = self.verify(identity_token).await?;
        let lease = self.leases.authorize(&account, &command).await?;
        let vehicle_id = lease.vehicle_id();

        if self.config.dry_run {
            info!(
                account = %account,
                vehicle_id = %vehicle_id,
                command = %command,
                "command authorized; dry run, not sent"
            );
            return Ok(CommandOutcome {
                account,
                vehicle_id,
                command,
                accepted: true,
                reason: None,
                simulated: true,
            });
        }

        let credential = self.tokens.usable(&self.config.fleet_account).await?;
        let access_token = credential.access_token();

        let woke = with_deadline(
            self.config.call_timeout,
            self.ports.vehicle_api.wake(access_token, vehicle_id),
            |limit| VehicleApiError::timeout(format!("wake exceeded {}s", limit.as_secs())),
        )
        .await;
        if let Err(error) = woke {
            warn!(vehicle_id = %vehicle_id, error = %error, "wake before command failed");
        }

        let ack = with_deadline(
            self.config.call_timeout,
            self.ports
                .vehicle_api
                .send_command(access_token, vehicle_id, &command),
            |limit| VehicleApiError::timeout(format!("command exceeded {}s", limit.as_secs())),
        )
        .await
        .map_err(map_vehicle_api_error)?;

        if ack.accepted {
            info!(
                account = %account,
                vehicle_id = %vehicle_id,
                command = %command,
                "command sent"
            );
        } else {
            warn!(
                account = %account,
                vehicle_id = %vehicle_id,
                command = %command,
                reason = ack.reason.as_deref().unwrap_or("unspecified"),
                "vehicle refused command"
            );
        }
        Ok(CommandOutcome {
            account,
            vehicle_id,
            command,
            accepted: ack.accepted,
            reason: ack.reason,
            simulated: false,
        })
    }

    async fn verify(&self, identity_token: &str) -> Result<AccountId, Error> {
        if identity_token.trim().is_empty() {
            return Err(Error::unauthenticated("identity token is required"));
        }
        let identity = with_deadline(
            self.config.call_timeout,
            self.ports.identity.verify(identity_token),
            |limit| {
                IdentityProviderError::timeout(format!(
                    "verification exceeded {}s",
                    limit.as_secs()
                ))
            },
        )
        .await
        .map_err(map_identity_error)?;
        Ok(identity.account)
    }
}

#[cfg(test)]
#[path = "command_gateway_tests.rs"]
mod tests;
