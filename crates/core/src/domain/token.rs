// Bearer Token Claims
//
// The pool only needs two facts from a token: who it belongs to and when it
// expires. Tokens are decoded WITHOUT signature verification - integrity is
// established upstream by the auth layer, this crate treats the claims as a
// cache-freshness hint only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::domain::error::{DomainError, Result};

/// Claims the engine reads from a bearer token payload
///
/// Extra claims in the payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier (the authenticated user)
    pub sub: String,
    /// Expiry as epoch seconds
    pub exp: i64,
}

impl TokenClaims {
    /// True when the token expires within `margin` of `now_millis`
    ///
    /// Already-expired tokens count as "within margin" too.
    pub fn expires_within(&self, now_millis: i64, margin: Duration) -> bool {
        let expires_at_millis = self.exp.saturating_mul(1000);
        expires_at_millis.saturating_sub(now_millis) <= margin.as_millis() as i64
    }
}

/// Decode the claims from the middle segment of a `header.payload.signature`
/// token
///
/// # Errors
/// - `DomainError::MalformedToken` if the token has no payload segment, the
///   segment is not base64url, or the payload is not the expected JSON shape
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| DomainError::MalformedToken("missing payload segment".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| DomainError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| DomainError::MalformedToken(format!("payload is not claims JSON: {}", e)))
}

/// Non-cryptographic digest of a token, used only as a pool map key
///
/// Keeps the map key collision-resistant without holding raw secrets as keys.
/// NOT a security measure - the raw token still travels inside the handle.
pub fn credential_hash(token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}
