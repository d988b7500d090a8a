//! Worker configuration loaded via OrthoConfig.
//!
//! Every field is optional. Accessors fall back to the component defaults so
//! an empty environment yields the same behaviour as the plain `Default`
//! configs, apart from the values that have no sensible default (database
//! URL, fleet account, OAuth client id).

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{
    AccountId, CommandName, GatewayConfig, HandshakeConfig, LeasePolicy, OverwritePolicy,
    ScheduleConfig, SyncConfig, SyncMethod, TokenStoreConfig, VehicleCacheConfig,
};
use crate::outbound::fleet_api::FleetApiEndpoints;
use crate::outbound::persistence::PoolConfig;

const DEFAULT_VEHICLE_API_BASE: &str = "https://fleet-api.prd.na.vn.cloud.tesla.com/";
const DEFAULT_TOKEN_URL: &str = "https://auth.tesla.com/oauth2/v3/token";
const DEFAULT_RELAY_BASE: &str = "http://localhost:5001/";

/// Errors raised while turning settings into component configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A value with no default was not supplied.
    #[error("missing required setting `{name}`")]
    Missing { name: &'static str },
    /// A supplied value could not be parsed.
    #[error("invalid value for `{name}`: {message}")]
    Invalid { name: &'static str, message: String },
}

impl SettingsError {
    fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            message: message.into(),
        }
    }
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

fn delta_secs(
    name: &'static str,
    value: Option<u64>,
    default: TimeDelta,
) -> Result<TimeDelta, SettingsError> {
    match value {
        None => Ok(default),
        Some(raw) => i64::try_from(raw)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| SettingsError::invalid(name, format!("{raw} seconds is out of range"))),
    }
}

fn parse_url(name: &'static str, raw: Option<&str>, default: &str) -> Result<Url, SettingsError> {
    let raw = raw.unwrap_or(default);
    // A base without a trailing slash would drop its last segment on join.
    let normalised = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalised).map_err(|err| SettingsError::invalid(name, err.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandList {
    One(String),
    Many(Vec<String>),
}

/// The environment layer turns `unlock,lock` into a sequence but leaves
/// `unlock` a plain string; accept both.
fn command_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = match Option::<CommandList>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(CommandList::One(raw)) => vec![raw],
        Some(CommandList::Many(items)) => items,
    };
    Ok(Some(
        list.iter()
            .flat_map(|item| item.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
    ))
}

/// Configuration of the rental worker.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "RENTAL")]
pub struct RentalCoreSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub database_pool_size: Option<u32>,
    /// Account whose credential reads and drives the fleet.
    pub fleet_account: Option<String>,
    /// Lease length used when a caller gives none, in seconds.
    pub lease_default_secs: Option<u64>,
    /// Longest lease a caller may request, in seconds.
    pub lease_max_secs: Option<u64>,
    /// Commands granted to every lease, as a list or a comma-separated
    /// string.
    #[serde(default, deserialize_with = "command_list")]
    pub allowed_commands: Option<Vec<String>>,
    /// `replace` or `reject_active`.
    pub overwrite_policy: Option<String>,
    /// Lifetime of an OAuth handshake session, in seconds.
    pub handshake_ttl_secs: Option<u64>,
    /// How long a cached credential is trusted, in seconds.
    pub credential_cache_ttl_secs: Option<u64>,
    /// Remaining lifetime below which credentials are refreshed, in seconds.
    pub refresh_threshold_secs: Option<u64>,
    /// Age below which cached vehicle state counts as fresh, in seconds.
    pub vehicle_cache_ttl_secs: Option<u64>,
    /// Change-log entries allowed to wait for delivery.
    pub log_queue_capacity: Option<usize>,
    /// Period of scheduled fleet syncs, in seconds.
    pub sync_interval_secs: Option<u64>,
    /// `direct` or `via_http`.
    pub sync_method: Option<String>,
    /// Pause between vehicles on direct syncs, in seconds.
    pub direct_delay_secs: Option<u64>,
    /// Pause between vehicles on relay syncs, in seconds.
    pub relay_delay_secs: Option<u64>,
    /// Wait after waking a vehicle, in seconds.
    pub wake_grace_secs: Option<u64>,
    /// Deadline for upstream calls, in seconds.
    pub call_timeout_secs: Option<u64>,
    /// Deadline for location reads, in seconds.
    pub location_timeout_secs: Option<u64>,
    /// Period of the credential refresh sweep, in seconds.
    pub refresh_sweep_interval_secs: Option<u64>,
    /// Period of the expired-handshake sweep, in seconds.
    pub handshake_sweep_interval_secs: Option<u64>,
    /// Base URL of the vehicle API.
    pub vehicle_api_base: Option<String>,
    /// OAuth token endpoint.
    pub token_url: Option<String>,
    /// OAuth client identifier.
    pub client_id: Option<String>,
    /// Redirect URI registered with the OAuth client.
    pub redirect_uri: Option<String>,
    /// Base URL of the telemetry relay.
    pub relay_base: Option<String>,
    /// Authorize commands without contacting vehicles.
    #[ortho_config(default = false)]
    pub dry_run: bool,
}

impl RentalCoreSettings {
    /// Database connection string.
    ///
    /// # Errors
    ///
    /// `Missing` when no URL is configured.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::Missing {
                name: "database_url",
            })
    }

    /// Fleet account identity.
    ///
    /// # Errors
    ///
    /// `Missing` when unset, `Invalid` when blank.
    pub fn fleet_account(&self) -> Result<AccountId, SettingsError> {
        let raw = self.fleet_account.as_deref().ok_or(SettingsError::Missing {
            name: "fleet_account",
        })?;
        AccountId::new(raw).map_err(|err| SettingsError::invalid("fleet_account", err.to_string()))
    }

    /// Deadline applied to upstream calls.
    pub fn call_timeout(&self) -> Duration {
        secs(self.call_timeout_secs, 30)
    }

    /// Database pool configuration.
    ///
    /// # Errors
    ///
    /// As for [`Self::database_url`].
    pub fn pool_config(&self) -> Result<PoolConfig, SettingsError> {
        let config = PoolConfig::new(self.database_url()?);
        Ok(match self.database_pool_size {
            Some(size) => config.with_max_size(size),
            None => config,
        })
    }

    /// Lease rules.
    ///
    /// # Errors
    ///
    /// `Invalid` for an unknown command, an unknown overwrite policy, a
    /// duration out of range, or a default longer than the maximum.
    pub fn lease_policy(&self) -> Result<LeasePolicy, SettingsError> {
        let defaults = LeasePolicy::default();
        let allowed_commands = match self.allowed_commands.as_deref() {
            None => defaults.allowed_commands,
            Some(names) => names
                .iter()
                .map(|name| {
                    CommandName::new(name).map_err(|err| {
                        SettingsError::invalid("allowed_commands", format!("{name}: {err}"))
                    })
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
        };
        let overwrite = match self.overwrite_policy.as_deref() {
            None => defaults.overwrite,
            Some(raw) => OverwritePolicy::parse(raw)
                .ok_or_else(|| SettingsError::invalid("overwrite_policy", raw))?,
        };
        let default_duration = delta_secs(
            "lease_default_secs",
            self.lease_default_secs,
            defaults.default_duration,
        )?;
        let max_duration =
            delta_secs("lease_max_secs", self.lease_max_secs, defaults.max_duration)?;
        if default_duration > max_duration {
            return Err(SettingsError::invalid(
                "lease_default_secs",
                "default lease is longer than the maximum",
            ));
        }
        Ok(LeasePolicy {
            allowed_commands,
            default_duration,
            max_duration,
            overwrite,
        })
    }

    /// Handshake store configuration.
    ///
    /// # Errors
    ///
    /// `Invalid` when the TTL is out of range.
    pub fn handshake_config(&self) -> Result<HandshakeConfig, SettingsError> {
        let defaults = HandshakeConfig::default();
        Ok(HandshakeConfig {
            session_ttl: delta_secs(
                "handshake_ttl_secs",
                self.handshake_ttl_secs,
                defaults.session_ttl,
            )?,
            ..defaults
        })
    }

    /// Credential store configuration.
    ///
    /// # Errors
    ///
    /// `Invalid` when a duration is out of range.
    pub fn token_store_config(&self) -> Result<TokenStoreConfig, SettingsError> {
        let defaults = TokenStoreConfig::default();
        Ok(TokenStoreConfig {
            cache_ttl: delta_secs(
                "credential_cache_ttl_secs",
                self.credential_cache_ttl_secs,
                defaults.cache_ttl,
            )?,
            refresh_threshold: delta_secs(
                "refresh_threshold_secs",
                self.refresh_threshold_secs,
                defaults.refresh_threshold,
            )?,
            call_timeout: self.call_timeout(),
        })
    }

    /// Vehicle cache configuration.
    ///
    /// # Errors
    ///
    /// `Invalid` when the TTL is out of range or the queue capacity is zero.
    pub fn vehicle_cache_config(&self) -> Result<VehicleCacheConfig, SettingsError> {
        let defaults = VehicleCacheConfig::default();
        let log_queue_capacity = self.log_queue_capacity.unwrap_or(defaults.log_queue_capacity);
        if log_queue_capacity == 0 {
            return Err(SettingsError::invalid("log_queue_capacity", "must be positive"));
        }
        Ok(VehicleCacheConfig {
            ttl: delta_secs("vehicle_cache_ttl_secs", self.vehicle_cache_ttl_secs, defaults.ttl)?,
            log_queue_capacity,
        })
    }

    /// Sync engine configuration.
    ///
    /// # Errors
    ///
    /// As for [`Self::fleet_account`].
    pub fn sync_config(&self) -> Result<SyncConfig, SettingsError> {
        let defaults = SyncConfig::for_account(self.fleet_account()?);
        Ok(SyncConfig {
            direct_delay: self.direct_delay_secs.map_or(defaults.direct_delay, Duration::from_secs),
            relay_delay: self.relay_delay_secs.map_or(defaults.relay_delay, Duration::from_secs),
            wake_grace: self.wake_grace_secs.map_or(defaults.wake_grace, Duration::from_secs),
            call_timeout: self.call_timeout(),
            location_timeout: self
                .location_timeout_secs
                .map_or(defaults.location_timeout, Duration::from_secs),
            ..defaults
        })
    }

    /// Background job intervals.
    ///
    /// # Errors
    ///
    /// `Invalid` for an unknown sync method.
    pub fn schedule_config(&self) -> Result<ScheduleConfig, SettingsError> {
        let defaults = ScheduleConfig::default();
        let sync_method = match self.sync_method.as_deref() {
            None => defaults.sync_method,
            Some(raw) => {
                SyncMethod::parse(raw).ok_or_else(|| SettingsError::invalid("sync_method", raw))?
            }
        };
        Ok(ScheduleConfig {
            sync_interval: self
                .sync_interval_secs
                .map_or(defaults.sync_interval, Duration::from_secs),
            sync_method,
            refresh_sweep_interval: self
                .refresh_sweep_interval_secs
                .map_or(defaults.refresh_sweep_interval, Duration::from_secs),
            handshake_sweep_interval: self
                .handshake_sweep_interval_secs
                .map_or(defaults.handshake_sweep_interval, Duration::from_secs),
        })
    }

    /// Command gateway configuration.
    ///
    /// # Errors
    ///
    /// As for [`Self::fleet_account`].
    pub fn gateway_config(&self) -> Result<GatewayConfig, SettingsError> {
        Ok(GatewayConfig {
            call_timeout: self.call_timeout(),
            dry_run: self.dry_run,
            ..GatewayConfig::for_account(self.fleet_account()?)
        })
    }

    /// Vehicle API endpoints and OAuth client identity.
    ///
    /// # Errors
    ///
    /// `Missing` without a client id, `Invalid` for a malformed URL.
    pub fn vehicle_api_endpoints(&self) -> Result<FleetApiEndpoints, SettingsError> {
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(SettingsError::Missing { name: "client_id" })?;
        Ok(FleetApiEndpoints {
            api_base: parse_url(
                "vehicle_api_base",
                self.vehicle_api_base.as_deref(),
                DEFAULT_VEHICLE_API_BASE,
            )?,
            token_url: Url::parse(self.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL))
                .map_err(|err| SettingsError::invalid("token_url", err.to_string()))?,
            client_id,
            redirect_uri: self.redirect_uri.clone(),
        })
    }

    /// Base URL of the telemetry relay.
    ///
    /// # Errors
    ///
    /// `Invalid` for a malformed URL.
    pub fn relay_base(&self) -> Result<Url, SettingsError> {
        parse_url("relay_base", self.relay_base.as_deref(), DEFAULT_RELAY_BASE)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for worker configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 8] = [
        "RENTAL_DATABASE_URL",
        "RENTAL_FLEET_ACCOUNT",
        "RENTAL_ALLOWED_COMMANDS",
        "RENTAL_OVERWRITE_POLICY",
        "RENTAL_LEASE_MAX_SECS",
        "RENTAL_SYNC_METHOD",
        "RENTAL_CLIENT_ID",
        "RENTAL_VEHICLE_API_BASE",
    ];

    fn load_from_empty_args() -> RentalCoreSettings {
        RentalCoreSettings::load_from_iter([OsString::from("rental-worker")])
            .expect("config should load")
    }

    fn cleared() -> Vec<(&'static str, Option<String>)> {
        VARS.iter().map(|name| (*name, None::<String>)).collect()
    }

    fn with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        let mut vars = cleared();
        for (name, value) in overrides {
            if let Some(slot) = vars.iter_mut().find(|(var, _)| var == name) {
                slot.1 = Some((*value).to_owned());
            }
        }
        vars
    }

    #[rstest]
    fn defaults_match_component_defaults() {
        let _guard = lock_env(cleared());

        let settings = load_from_empty_args();
        assert_eq!(settings.lease_policy().expect("policy"), LeasePolicy::default());
        assert_eq!(
            settings.schedule_config().expect("schedule"),
            ScheduleConfig::default()
        );
        assert_eq!(
            settings.vehicle_cache_config().expect("cache"),
            VehicleCacheConfig::default()
        );
        assert_eq!(
            settings.token_store_config().expect("tokens"),
            TokenStoreConfig::default()
        );
        assert!(!settings.dry_run);
    }

    #[rstest]
    fn values_without_defaults_are_reported() {
        let _guard = lock_env(cleared());

        let settings = load_from_empty_args();
        assert_eq!(
            settings.database_url(),
            Err(SettingsError::Missing {
                name: "database_url"
            })
        );
        assert!(matches!(
            settings.sync_config(),
            Err(SettingsError::Missing {
                name: "fleet_account"
            })
        ));
        assert!(matches!(
            settings.vehicle_api_endpoints(),
            Err(SettingsError::Missing { name: "client_id" })
        ));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(with(&[
            ("RENTAL_DATABASE_URL", "postgres://localhost/rental"),
            ("RENTAL_FLEET_ACCOUNT", "fleet@example.com"),
            ("RENTAL_ALLOWED_COMMANDS", "unlock, lock"),
            ("RENTAL_OVERWRITE_POLICY", "reject_active"),
            ("RENTAL_LEASE_MAX_SECS", "7200"),
            ("RENTAL_SYNC_METHOD", "via_http"),
            ("RENTAL_CLIENT_ID", "client-123"),
            ("RENTAL_VEHICLE_API_BASE", "https://fleet.example.com"),
        ]));

        let settings = load_from_empty_args();
        let policy = settings.lease_policy().expect("policy");
        assert_eq!(policy.allowed_commands.len(), 2);
        assert_eq!(policy.overwrite, OverwritePolicy::RejectActive);
        assert_eq!(policy.max_duration, TimeDelta::hours(2));
        assert_eq!(
            settings.schedule_config().expect("schedule").sync_method,
            SyncMethod::ViaHttp
        );
        assert_eq!(
            settings.sync_config().expect("sync").fleet_account.as_ref(),
            "fleet@example.com"
        );
        let endpoints = settings.vehicle_api_endpoints().expect("endpoints");
        assert_eq!(endpoints.api_base.as_str(), "https://fleet.example.com/");
        assert_eq!(endpoints.client_id, "client-123");
        assert_eq!(
            settings.pool_config().expect("pool").database_url(),
            "postgres://localhost/rental"
        );
    }

    #[rstest]
    #[case("unlock", &["unlock"])]
    #[case("unlock,lock", &["lock", "unlock"])]
    #[case(" honk_horn , flash_lights ,", &["flash_lights", "honk_horn"])]
    fn allowed_commands_accept_one_or_many(#[case] raw: &str, #[case] expected: &[&str]) {
        let _guard = lock_env(with(&[("RENTAL_ALLOWED_COMMANDS", raw)]));

        let settings = load_from_empty_args();
        let policy = settings.lease_policy().expect("policy");
        let names: Vec<&str> = policy
            .allowed_commands
            .iter()
            .map(|name| name.as_ref())
            .collect();
        assert_eq!(names, expected);
    }

    #[rstest]
    #[case("RENTAL_OVERWRITE_POLICY", "merge", "overwrite_policy")]
    #[case("RENTAL_SYNC_METHOD", "carrier_pigeon", "sync_method")]
    #[case("RENTAL_ALLOWED_COMMANDS", "unlock,open trunk", "allowed_commands")]
    fn unknown_values_are_rejected(
        #[case] var: &'static str,
        #[case] value: &str,
        #[case] expected: &'static str,
    ) {
        let _guard = lock_env(with(&[(var, value)]));

        let settings = load_from_empty_args();
        let error = settings
            .lease_policy()
            .and_then(|_| settings.schedule_config().map(|_| ()))
            .expect_err("value should be rejected");
        assert!(matches!(error, SettingsError::Invalid { name, .. } if name == expected));
    }

    #[rstest]
    fn default_lease_may_not_exceed_maximum() {
        let _guard = lock_env(with(&[("RENTAL_LEASE_MAX_SECS", "60")]));

        let settings = load_from_empty_args();
        assert!(matches!(
            settings.lease_policy(),
            Err(SettingsError::Invalid {
                name: "lease_default_secs",
                ..
            })
        ));
    }
}
