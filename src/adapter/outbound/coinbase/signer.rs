//! `CB-ACCESS-*` request signing.
//!
//! The signature is the base64 HMAC-SHA256, keyed by the base64-decoded
//! secret, of `timestamp + METHOD + request_path + body`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::VenueError;
use crate::infrastructure::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const KEY_HEADER: &str = "CB-ACCESS-KEY";
pub const SIGN_HEADER: &str = "CB-ACCESS-SIGN";
pub const TIMESTAMP_HEADER: &str = "CB-ACCESS-TIMESTAMP";
pub const PASSPHRASE_HEADER: &str = "CB-ACCESS-PASSPHRASE";

#[derive(Clone)]
pub struct Signer {
    api_key: String,
    passphrase: String,
    secret: Vec<u8>,
}

impl Signer {
    /// Fails when the passphrase is missing or the secret is not base64.
    pub fn new(credentials: &Credentials) -> Result<Self, VenueError> {
        let passphrase = credentials.passphrase().ok_or_else(|| {
            VenueError::InvalidCredentials("coinbase requires an API passphrase".into())
        })?;
        let secret = STANDARD
            .decode(credentials.api_secret().trim())
            .map_err(|e| VenueError::InvalidCredentials(format!("API secret is not base64: {e}")))?;
        Ok(Self {
            api_key: credentials.api_key().to_string(),
            passphrase: passphrase.to_string(),
            secret,
        })
    }

    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, VenueError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| VenueError::InvalidCredentials(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.to_ascii_uppercase().as_bytes());
        mac.update(request_path.as_bytes());
        mac.update(body.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Authentication headers for one request.
    pub fn headers(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<[(&'static str, String); 4], VenueError> {
        Ok([
            (KEY_HEADER, self.api_key.clone()),
            (SIGN_HEADER, self.sign(timestamp, method, request_path, body)?),
            (TIMESTAMP_HEADER, timestamp.to_string()),
            (PASSPHRASE_HEADER, self.passphrase.clone()),
        ])
    }
}
