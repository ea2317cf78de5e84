//! # PKCE Primitives
//!
//! Proof Key for Code Exchange (RFC 7636) material for the authorization-code
//! flow: code verifier, derived code challenge, and the anti-CSRF state.
//!
//! ```text
//! verifier  = 43-128 random chars from [A-Za-z0-9]
//! challenge = base64url_nopad( SHA-256(verifier) )
//! state     = 128 random bits, hex-encoded
//! ```
//!
//! The challenge travels to the authorization endpoint; the verifier stays
//! local until the token exchange, which is what binds the authorization code
//! to this installation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};

use stockbridge_core::{MAX_CODE_VERIFIER_LEN, MIN_CODE_VERIFIER_LEN};

/// Alphabet for code verifiers. Deliberately alphanumeric only; the RFC's
/// `-._~` extras are permitted but never emitted.
const VERIFIER_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random code verifier of random length in 43..=128.
pub fn generate_code_verifier() -> String {
    let mut rng = rand::rng();
    let length = rng.random_range(MIN_CODE_VERIFIER_LEN..=MAX_CODE_VERIFIER_LEN);

    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..VERIFIER_CHARSET.len());
            VERIFIER_CHARSET[idx] as char
        })
        .collect()
}

/// Derives the S256 code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generates a 128-bit anti-CSRF state, hex-encoded (32 characters).
pub fn generate_state() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// =============================================================================
// Tests
// =============================================================================
