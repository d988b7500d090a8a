//! Mapping of upstream port failures onto domain errors.

use super::Error;
use super::ports::{IdentityProviderError, TelemetryRelayError, VehicleApiError};

/// Map a vehicle API failure: timeouts stay timeouts, everything else is a
/// remote rejection.
pub(crate) fn map_vehicle_api_error(error: VehicleApiError) -> Error {
    match error {
        VehicleApiError::Timeout { .. } => Error::upstream_timeout(error.to_string()),
        VehicleApiError::Transport { .. }
        | VehicleApiError::RateLimited { .. }
        | VehicleApiError::Rejected { .. }
        | VehicleApiError::Decode { .. } => Error::upstream_rejected(error.to_string()),
    }
}

/// Map a telemetry relay failure.
pub(crate) fn map_relay_error(error: TelemetryRelayError) -> Error {
    match error {
        TelemetryRelayError::Timeout { .. } => Error::upstream_timeout(error.to_string()),
        TelemetryRelayError::Transport { .. }
        | TelemetryRelayError::Rejected { .. }
        | TelemetryRelayError::Decode { .. } => Error::upstream_rejected(error.to_string()),
    }
}

/// Map an identity provider failure.
pub(crate) fn map_identity_error(error: IdentityProviderError) -> Error {
    match error {
        IdentityProviderError::Invalid { .. } => Error::unauthenticated(error.to_string()),
        IdentityProviderError::Unavailable { .. } => Error::upstream_rejected(error.to_string()),
        IdentityProviderError::Timeout { .. } => Error::upstream_timeout(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(VehicleApiError::timeout("slow"), ErrorCode::UpstreamTimeout)]
    #[case(VehicleApiError::rate_limited("429"), ErrorCode::UpstreamRejected)]
    #[case(VehicleApiError::rejected("401"), ErrorCode::UpstreamRejected)]
    #[case(VehicleApiError::transport("reset"), ErrorCode::UpstreamRejected)]
    fn vehicle_api_errors_map_to_upstream_codes(
        #[case] error: VehicleApiError,
        #[case] expected: ErrorCode,
    ) {
        assert_eq!(map_vehicle_api_error(error).code(), expected);
    }

    #[rstest]
    #[case(IdentityProviderError::invalid("bad sig"), ErrorCode::Unauthenticated)]
    #[case(IdentityProviderError::unavailable("down"), ErrorCode::UpstreamRejected)]
    #[case(IdentityProviderError::timeout("10s"), ErrorCode::UpstreamTimeout)]
    fn identity_errors_map(#[case] error: IdentityProviderError, #[case] expected: ErrorCode) {
        assert_eq!(map_identity_error(error).code(), expected);
    }

    #[rstest]
    fn relay_timeouts_stay_timeouts() {
        let err = map_relay_error(TelemetryRelayError::timeout("60s"));
        assert_eq!(err.code(), ErrorCode::UpstreamTimeout);
    }
}
