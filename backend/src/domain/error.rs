//! Domain-level error types.
//!
//! These errors are transport agnostic. Callers map them onto HTTP responses
//! or whatever envelope their surface uses; the core only promises a stable
//! [`ErrorCode`] and, for authorization failures, a [`DenialReason`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The input is malformed or fails validation.
    InvalidArgument,
    /// The requested record does not exist (or has expired).
    NotFound,
    /// The caller is known but not permitted; see [`DenialReason`].
    Denied,
    /// A time-boxed record was used after its deadline.
    Expired,
    /// The identity token was rejected.
    Unauthenticated,
    /// The operation conflicts with existing state.
    Conflict,
    /// An upstream collaborator did not answer in time.
    UpstreamTimeout,
    /// An upstream collaborator answered with a failure.
    UpstreamRejected,
    /// Durable storage could not complete the operation.
    StorageUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

impl ErrorCode {
    /// Snake-case identifier for logs and envelopes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Unauthenticated => "unauthenticated",
            Self::Conflict => "conflict",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamRejected => "upstream_rejected",
            Self::StorageUnavailable => "storage_unavailable",
            Self::InternalError => "internal_error",
        }
    }

    /// Whether the code belongs to the upstream failure family.
    pub const fn is_upstream(self) -> bool {
        matches!(self, Self::UpstreamTimeout | Self::UpstreamRejected)
    }
}

/// Why an authorization request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The account holds no lease.
    NoLease,
    /// The lease window has closed.
    Expired,
    /// The command is outside the lease's allowed set.
    CommandNotAllowed,
}

impl DenialReason {
    /// Snake-case identifier for logs and envelopes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoLease => "no_lease",
            Self::Expired => "expired",
            Self::CommandNotAllowed => "command_not_allowed",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is non-empty; blank input falls back to the code identifier.
/// - `denial` is present only for [`ErrorCode::Denied`].
///
/// # Examples
/// ```
/// use rental_core::domain::{DenialReason, Error, ErrorCode};
///
/// let err = Error::denied(DenialReason::Expired, "lease expired");
/// assert_eq!(err.code(), ErrorCode::Denied);
/// assert_eq!(err.denial_reason(), Some(DenialReason::Expired));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
    message: String,
    denial: Option<DenialReason>,
}

impl Error {
    /// Create a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.as_str().to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            denial: None,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Reason attached to [`ErrorCode::Denied`] errors.
    pub fn denial_reason(&self) -> Option<DenialReason> {
        self.denial
    }

    /// Convenience constructor for [`ErrorCode::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Denied`].
    pub fn denied(reason: DenialReason, message: impl Into<String>) -> Self {
        Self {
            denial: Some(reason),
            ..Self::new(ErrorCode::Denied, message)
        }
    }

    /// Convenience constructor for [`ErrorCode::Expired`].
    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Expired, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthenticated`].
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::UpstreamTimeout`].
    pub fn upstream_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamTimeout, message)
    }

    /// Convenience constructor for [`ErrorCode::UpstreamRejected`].
    pub fn upstream_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamRejected, message)
    }

    /// Convenience constructor for [`ErrorCode::StorageUnavailable`].
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.denial {
            Some(reason) => write!(f, "{} ({reason})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Error {}
