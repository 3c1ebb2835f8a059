use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AuthError;

/// Refresh access tokens that expire within this window.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Decode the JWT `exp` claim without verifying the signature.
///
/// The backend verifies tokens; this is only used to decide when to refresh.
///
/// # Errors
///
/// Returns `AuthError::Decode` if the JWT format is invalid or the `exp` claim
/// is missing or cannot be parsed.
pub fn decode_expiry(jwt: &str) -> Result<DateTime<Utc>, AuthError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::Decode("invalid JWT format".into()));
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AuthError::Decode(format!("base64 decode failed: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::Decode(format!("JSON parse failed: {e}")))?;
    let exp = value["exp"]
        .as_i64()
        .ok_or_else(|| AuthError::Decode("missing exp claim".into()))?;
    DateTime::from_timestamp(exp, 0).ok_or_else(|| AuthError::Decode("invalid exp timestamp".into()))
}

/// True when the token expires within `buffer_secs`.
///
/// Tokens whose expiry cannot be read are left for the backend to judge.
#[must_use]
pub fn is_near_expiry(jwt: &str, buffer_secs: i64) -> bool {
    match decode_expiry(jwt) {
        Ok(expires_at) => expires_at <= Utc::now() + TimeDelta::seconds(buffer_secs),
        Err(error) => {
            tracing::debug!(%error, "cannot read access token expiry");
            false
        }
    }
}
