use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Payload signed into every access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub handle: String,
    pub resources: Vec<String>,
    #[serde(rename = "exp")]
    pub expires: i64,
}

impl Claims {
    /// Claims for `handle` valid for `lifetime` starting at `now`.
    #[must_use]
    pub fn new(handle: &str, resources: &[String], now: i64, lifetime: Duration) -> Self {
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        Self {
            handle: handle.to_string(),
            resources: resources.to_vec(),
            expires: now.saturating_add(lifetime),
        }
    }

    /// Expiry is strict: a token is void at the second it expires.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now >= self.expires
    }
}

/// Serialize claims into the bytes that get signed.
///
/// # Errors
/// Returns an error if the claims cannot be encoded as JSON.
pub fn encode(claims: &Claims) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(claims)
}

/// Parse claims back out of a verified payload.
///
/// # Errors
/// Returns an error if the payload is not a JSON claim set.
pub fn decode(bytes: &[u8]) -> Result<Claims, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
