//! Identifiers shared by leases, credentials, and vehicle records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation errors returned by identifier constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityValidationError {
    /// Account identifier was blank once trimmed.
    EmptyAccount,
    /// Command name was blank once trimmed.
    EmptyCommand,
    /// Command name contained characters outside `[a-z0-9_]`.
    InvalidCommand,
}

impl fmt::Display for IdentityValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAccount => write!(f, "account identity must not be empty"),
            Self::EmptyCommand => write!(f, "command name must not be empty"),
            Self::InvalidCommand => write!(
                f,
                "command name may only contain lowercase letters, digits, or underscores"
            ),
        }
    }
}

impl std::error::Error for IdentityValidationError {}

/// Account identity used as the lease key and credential owner.
///
/// ## Invariants
/// - Trimmed and non-empty.
///
/// # Examples
/// ```
/// use rental_core::domain::AccountId;
///
/// let account = AccountId::new("  driver@example.com ").unwrap();
/// assert_eq!(account.as_ref(), "driver@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and construct an account identity.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdentityValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdentityValidationError::EmptyAccount);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = IdentityValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Vehicle identifier as issued by the vehicle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(i64);

impl VehicleId {
    /// Wrap a raw vehicle identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VehicleId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Name of a remote vehicle command such as `unlock`.
///
/// Normalised to lowercase so `Unlock` and `unlock` are the same command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandName(String);

impl CommandName {
    /// Validate and construct a command name.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdentityValidationError> {
        let normalised = raw.as_ref().trim().to_ascii_lowercase();
        if normalised.is_empty() {
            return Err(IdentityValidationError::EmptyCommand);
        }
        if !normalised
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(IdentityValidationError::InvalidCommand);
        }
        Ok(Self(normalised))
    }
}

impl AsRef<str> for CommandName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CommandName> for String {
    fn from(value: CommandName) -> Self {
        value.0
    }
}

impl TryFrom<String> for CommandName {
    type Error = IdentityValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_account_is_rejected(#[case] raw: &str) {
        let err = AccountId::new(raw).expect_err("blank account must fail");
        assert_eq!(err, IdentityValidationError::EmptyAccount);
    }

    #[rstest]
    #[case("Unlock", "unlock")]
    #[case(" honk_horn ", "honk_horn")]
    fn command_names_are_normalised(#[case] raw: &str, #[case] expected: &str) {
        let command = CommandName::new(raw).expect("valid command");
        assert_eq!(command.as_ref(), expected);
    }

    #[rstest]
    #[case("", IdentityValidationError::EmptyCommand)]
    #[case("open trunk", IdentityValidationError::InvalidCommand)]
    #[case("unlock;drop", IdentityValidationError::InvalidCommand)]
    fn malformed_command_names_are_rejected(
        #[case] raw: &str,
        #[case] expected: IdentityValidationError,
    ) {
        let err = CommandName::new(raw).expect_err("malformed command must fail");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn account_round_trips_through_serde() {
        let account = AccountId::new("a@b.com").expect("valid account");
        let json = serde_json::to_string(&account).expect("serialise");
        assert_eq!(json, "\"a@b.com\"");
        let blank: Result<AccountId, _> = serde_json::from_str("\" \"");
        assert!(blank.is_err());
    }
}
