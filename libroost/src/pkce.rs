//! PKCE challenge generation for the OAuth2 authorization-code flow
//!
//! Implements the S256 transform: the challenge is the URL-safe, unpadded
//! base64 encoding of the SHA-256 digest of the verifier's UTF-8 bytes. The
//! CSRF `state` token is generated independently of the verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A verifier/challenge/state triple for one authorization handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Secret retained server-side until the callback presents the code.
    pub verifier: String,
    /// S256 transform of the verifier, sent in the authorization URL.
    pub challenge: String,
    /// CSRF-binding token round-tripped through the redirect.
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh triple from OS randomness. Pure generation, no side
    /// effects.
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = challenge_for(&verifier);
        let state = random_token();

        Self {
            verifier,
            challenge,
            state,
        }
    }
}

/// 32 bytes of OS entropy, URL-safe base64 without padding.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The S256 code-challenge transform over an ASCII verifier string.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
