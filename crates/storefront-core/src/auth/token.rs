//! Access token handling and expiry detection.
//!
//! Tokens are treated as opaque except for the `exp` claim in the JWT
//! payload. Anything that cannot be decoded counts as expired.

use std::fmt;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Bearer credential attached to API calls.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// The `exp` claim in seconds since the epoch, if the payload decodes
    pub fn expires_at(&self) -> Option<f64> {
        let payload = self.0.split('.').nth(1)?;
        let claims = decode_segment(payload)?;
        let exp = claims.get("exp")?.as_f64()?;
        exp.is_finite().then_some(exp)
    }

    /// Expired iff `exp * 1000 < now_ms`. Undecodable tokens are expired.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at() {
            Some(exp) => exp * 1000.0 < now_ms as f64,
            None => {
                debug!("Access token payload could not be decoded, treating as expired");
                true
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Whole seconds until expiry, zero when already expired or undecodable
    pub fn seconds_until_expiry(&self) -> i64 {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.expires_at()
            .map(|exp| (exp - now).floor().max(0.0) as i64)
            .unwrap_or(0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Decode a base64url JSON segment, tolerating padding and the standard alphabet.
fn decode_segment(segment: &str) -> Option<Value> {
    let trimmed = segment.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}
