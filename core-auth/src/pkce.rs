//! PKCE (Proof Key for Code Exchange) support, RFC 7636.
//!
//! The verifier and `state` live only inside an [`AuthRequest`](crate::flow::AuthRequest)
//! and are dropped as soon as the code exchange finishes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

/// Only S256 is supported; `plain` is never offered.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier: 32 random bytes, base64url without padding (43 chars).
#[derive(Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    pub fn from_string(verifier: impl Into<String>) -> Self {
        Self(verifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `BASE64URL(SHA256(verifier))`
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PkceVerifier([REDACTED])")
    }
}

/// Random opaque `state` value for CSRF protection (16 bytes, base64url).
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
