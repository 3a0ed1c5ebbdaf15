//! PKCE (RFC 7636) verifier/challenge pairs for the authorization code flow

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 64;

/// PKCE pair containing both verifier and challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Sent to the token endpoint; kept in the state cookie meanwhile
    pub code_verifier: String,
    /// Sent to the authorization endpoint
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate a new PKCE verifier/challenge pair
    pub fn generate() -> Self {
        let code_verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();
        let code_challenge = code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
        }
    }
}

/// `BASE64URL(SHA256(verifier))`, the S256 challenge method
pub fn code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}
