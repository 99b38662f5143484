//! PKCE (RFC 7636) verifier, challenge and state generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};

/// Verifier length in bytes before base64url encoding.
const VERIFIER_BYTES: usize = 32;

/// State length in bytes before base64url encoding.
const STATE_BYTES: usize = 16;

/// One authorization attempt's PKCE material.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// High-entropy secret sent only with the token exchange.
    pub verifier: String,
    /// `BASE64URL(SHA256(verifier))`, sent with the authorization request.
    pub challenge: String,
    /// Random value echoed back on the redirect.
    pub state: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier, its S256 challenge and a state value.
    pub fn generate() -> Self {
        let verifier = random_token(VERIFIER_BYTES);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(STATE_BYTES),
        }
    }

    /// Returns the challenge method sent alongside the challenge.
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Computes the S256 challenge for `verifier`.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}
