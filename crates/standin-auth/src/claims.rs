use base64::Engine as _;
use chrono::{DateTime, Utc};

use crate::error::AuthError;

fn decode_payload(jwt: &str) -> Result<serde_json::Value, AuthError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::Other("invalid JWT format".into()));
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthError::Other(format!("base64 decode failed: {e}")))?;
    serde_json::from_slice(&payload).map_err(|e| AuthError::Other(format!("JSON parse failed: {e}")))
}

/// Decode the `exp` claim without verifying the signature; the provider
/// remains the authority. Used to judge whether a recovered token is still
/// worth presenting.
///
/// # Errors
///
/// Returns `AuthError::Other` if the JWT is malformed or `exp` is missing.
pub fn decode_expiry(jwt: &str) -> Result<DateTime<Utc>, AuthError> {
    let value = decode_payload(jwt)?;
    let exp = value["exp"]
        .as_i64()
        .ok_or_else(|| AuthError::Other("missing exp claim".into()))?;
    DateTime::from_timestamp(exp, 0).ok_or_else(|| AuthError::Other("invalid exp timestamp".into()))
}
