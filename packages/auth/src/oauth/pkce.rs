// ABOUTME: PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
// ABOUTME: Generates code verifiers and SHA256 challenges for secure OAuth flows

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{
    error::{AuthError, AuthResult},
    oauth::types::PkceChallenge,
};

/// Number of random bytes behind each code verifier
const VERIFIER_BYTES: usize = 32;

/// Generate a PKCE challenge for OAuth flow
///
/// This generates a random code verifier and computes the SHA256 challenge
/// according to RFC 7636 (PKCE) specification.
pub fn generate_pkce_challenge() -> AuthResult<PkceChallenge> {
    let code_verifier = generate_code_verifier()?;
    let code_challenge = generate_code_challenge(&code_verifier);

    Ok(PkceChallenge {
        code_verifier,
        code_challenge,
        code_challenge_method: "S256".to_string(),
    })
}

/// Generate a code verifier from 32 random bytes (43 base64url characters)
fn generate_code_verifier() -> AuthResult<String> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::thread_rng()
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Pkce(format!("Failed to generate code verifier: {}", e)))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate SHA256 code challenge from verifier
fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());

    // Base64 URL-safe encode (without padding)
    URL_SAFE_NO_PAD.encode(hash)
}

/// Verify that a code verifier matches a code challenge
///
/// This is typically done by the authorization server, but can be useful
/// for testing and validation.
pub fn verify_pkce_challenge(verifier: &str, challenge: &str) -> bool {
    generate_code_challenge(verifier) == challenge
}
