//! Random handshake values and the PKCE S256 challenge.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Random bytes behind a `state` value (43 characters once encoded).
pub const STATE_BYTES: usize = 32;
/// Random bytes behind a code verifier (86 characters once encoded).
pub const VERIFIER_BYTES: usize = 64;

/// Source of unguessable handshake values.
pub trait HandshakeTokenSource: Send + Sync {
    /// A fresh `state` value.
    fn state(&self) -> String;

    /// A fresh PKCE code verifier.
    fn code_verifier(&self) -> Zeroizing<String>;
}

/// Token source backed by the operating system RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngTokenSource;

impl HandshakeTokenSource for OsRngTokenSource {
    fn state(&self) -> String {
        String::clone(&random_token::<STATE_BYTES>())
    }

    fn code_verifier(&self) -> Zeroizing<String> {
        random_token::<VERIFIER_BYTES>()
    }
}

fn random_token<const N: usize>() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0_u8; N]);
    OsRng.fill_bytes(bytes.as_mut_slice());
    Zeroizing::new(URL_SAFE_NO_PAD.encode(bytes.as_slice()))
}

/// PKCE S256 challenge: base64url(sha256(verifier)) without padding.
///
/// # Examples
/// ```
/// use rental_core::domain::pkce_challenge;
///
/// let challenge = pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
/// assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
/// ```
pub fn pkce_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn os_rng_values_have_expected_shape() {
        let source = OsRngTokenSource;
        let state = source.state();
        let verifier = source.code_verifier();

        assert_eq!(state.len(), 43);
        assert_eq!(verifier.len(), 86);
        assert!(
            state
                .chars()
                .chain(verifier.chars())
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "values must be base64url without padding"
        );
    }

    #[rstest]
    fn os_rng_values_do_not_repeat() {
        let source = OsRngTokenSource;
        assert_ne!(source.state(), source.state());
        assert_ne!(*source.code_verifier(), *source.code_verifier());
    }

    #[rstest]
    fn challenge_matches_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
