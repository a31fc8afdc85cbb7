// Shared helpers for the integration test suite

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Mint an unsigned `header.payload.signature` token with the given subject
/// and expiry (epoch seconds)
///
/// The engine never verifies signatures, so a dummy third segment is enough
/// for every pool scenario.
pub fn encode_token(sub: &str, exp_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload =
        URL_SAFE_NO_PAD.encode(serde_json::json!({"sub": sub, "exp": exp_secs}).to_string());
    format!("{}.{}.sig", header, payload)
}
