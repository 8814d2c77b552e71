//! HMAC-SHA256 query signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::VenueError;
use crate::infrastructure::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Default validity window for signed requests (milliseconds).
pub const DEFAULT_RECV_WINDOW: u64 = 5000;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &str, payload: &str) -> Result<String, VenueError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| VenueError::InvalidCredentials(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    recv_window: u64,
}

impl Signer {
    #[must_use]
    pub const fn new(credentials: Credentials, recv_window: u64) -> Self {
        Self {
            credentials,
            recv_window,
        }
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Append `recvWindow`, `timestamp` and `signature` to an encoded query.
    pub fn signed_query(&self, query: &str, timestamp_ms: i64) -> Result<String, VenueError> {
        let mut payload = String::with_capacity(query.len() + 64);
        if !query.is_empty() {
            payload.push_str(query);
            payload.push('&');
        }
        payload.push_str(&format!(
            "recvWindow={}&timestamp={timestamp_ms}",
            self.recv_window
        ));
        let signature = sign(self.credentials.api_secret(), &payload)?;
        Ok(format!("{payload}&signature={signature}"))
    }
}
