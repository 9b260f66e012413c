//! State and PKCE generation.

use crate::error::OAuthResult;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Random bytes behind a state value (43 base64url characters).
const STATE_BYTES: usize = 32;

/// Random bytes behind a code verifier. 96 bytes encode to exactly 128
/// base64url characters, the longest verifier RFC 7636 allows.
const CODE_VERIFIER_BYTES: usize = 96;

pub const CODE_CHALLENGE_METHOD: &str = "S256";

fn random_urlsafe(len: usize) -> OAuthResult<String> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate an opaque anti-CSRF state value.
pub fn generate_state() -> OAuthResult<String> {
    random_urlsafe(STATE_BYTES)
}

/// Generate a 128 character code verifier from the URL-safe alphabet.
pub fn gen_pkce_code_verifier() -> OAuthResult<String> {
    random_urlsafe(CODE_VERIFIER_BYTES)
}

/// `BASE64URL(SHA256(verifier))`, without padding.
pub fn derive_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn generate() -> OAuthResult<Self> {
        let code_verifier = gen_pkce_code_verifier()?;
        let code_challenge = derive_code_challenge(&code_verifier);

        Ok(Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CODE_CHALLENGE_METHOD.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_urlsafe(value: &str) -> bool {
        value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_gen_pkce_code_verifier() {
        let verifier = gen_pkce_code_verifier().unwrap();
        assert_eq!(verifier.len(), 128);
        assert!(is_urlsafe(&verifier));
    }

    #[test]
    fn test_code_verifiers_are_unique() {
        let verifiers: HashSet<String> = (0..1000)
            .map(|_| gen_pkce_code_verifier().unwrap())
            .collect();

        assert_eq!(verifiers.len(), 1000);
        assert!(verifiers.iter().all(|v| v.len() == 128));
    }

    #[test]
    fn test_derive_code_challenge_rfc7636_vector() {
        // RFC 7636, appendix B
        let challenge = derive_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_generate_state() {
        let state1 = generate_state().unwrap();
        let state2 = generate_state().unwrap();

        assert_ne!(state1, state2);
        assert_eq!(state1.len(), 43);
        assert!(is_urlsafe(&state1));
    }

    #[test]
    fn test_pkce_generation() {
        let pkce1 = PkceChallenge::generate().unwrap();
        let pkce2 = PkceChallenge::generate().unwrap();

        assert_ne!(pkce1.code_verifier, pkce2.code_verifier);
        assert_ne!(pkce1.code_challenge, pkce2.code_challenge);
        assert_eq!(pkce1.code_challenge_method, "S256");
        assert_eq!(
            pkce1.code_challenge,
            derive_code_challenge(&pkce1.code_verifier)
        );
        // SHA-256 digest is 32 bytes, 43 chars unpadded
        assert_eq!(pkce1.code_challenge.len(), 43);
    }
}
