//! Completes a staged handshake from the provider callback.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tracing::{info, warn};
use url::Url;

use crate::domain::ports::{VehicleApi, VehicleApiError};
use crate::domain::runtime::with_deadline;
use crate::domain::upstream::map_vehicle_api_error;
use crate::domain::{AccountId, Error, TokenStore};

use super::AuthHandshakeStore;

/// Exchanges the authorization code from a provider callback for a
/// credential and stores it for the account that began the handshake.
#[derive(Clone)]
pub struct CallbackExchange {
    handshakes: AuthHandshakeStore,
    tokens: TokenStore,
    api: Arc<dyn VehicleApi>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl CallbackExchange {
    /// Create an exchange helper.
    pub fn new(
        handshakes: AuthHandshakeStore,
        tokens: TokenStore,
        api: Arc<dyn VehicleApi>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            handshakes,
            tokens,
            api,
            clock,
            call_timeout,
        }
    }

    /// Complete the handshake named by the `state` in `callback_url`.
    ///
    /// The session is removed before the code is exchanged, so a `state` is
    /// honoured at most once whatever the exchange outcome.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when the URL is malformed or carries no `state`.
    /// - `NotFound` when the state is unknown, expired, or already used.
    /// - `UpstreamTimeout`/`UpstreamRejected` when the code exchange fails.
    /// - `StorageUnavailable` when the session cannot be removed or the
    ///   credential cannot be saved.
    pub async fn exchange(&self, callback_url: &str) -> Result<AccountId, Error> {
        let url = Url::parse(callback_url)
            .map_err(|err| Error::invalid_argument(format!("invalid callback url: {err}")))?;
        let state = url
            .query_pairs()
            .find_map(|(key, value)| (key == "state").then(|| value.into_owned()))
            .ok_or_else(|| Error::invalid_argument("callback url carries no state"))?;

        let session = self.handshakes.consume(&state).await?;
        let grant = with_deadline(
            self.call_timeout,
            self.api.exchange_code(&url, &session.code_verifier),
            |limit| {
                VehicleApiError::timeout(format!("code exchange exceeded {}s", limit.as_secs()))
            },
        )
        .await
        .map_err(|error| {
            warn!(
                session_id = %session.session_id,
                error = %error,
                "authorization code exchange failed"
            );
            map_vehicle_api_error(error)
        })?;
        let credential = grant.into_credential(self.clock.utc(), None);
        self.tokens.save(&session.account, credential).await?;
        info!(account = %session.account, "credential stored from handshake");
        Ok(session.account)
    }
}
