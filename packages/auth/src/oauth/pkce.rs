// ABOUTME: PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
// ABOUTME: Also generates the per-session CSRF and state secrets

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// PKCE challenge for an OAuth flow (RFC 7636, S256 method).
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

/// Generate a PKCE challenge for the authorization request.
pub fn generate_pkce_challenge() -> PkceChallenge {
    let code_verifier = generate_session_token(64);
    let code_challenge = generate_code_challenge(&code_verifier);
    PkceChallenge {
        code_verifier,
        code_challenge,
        code_challenge_method: "S256".to_string(),
    }
}

/// Generate a random unguessable alphanumeric secret.
///
/// Used for the PKCE verifier, the per-session CSRF token, and the OAuth
/// `state` parameter.
pub fn generate_session_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// SHA256 code challenge from a verifier, base64url without padding.
fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
