//! `API-Sign` request signing and nonce generation.
//!
//! `API-Sign = base64(HMAC-SHA512(path + SHA256(nonce + postdata)))`, keyed
//! by the base64-decoded secret.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::error::VenueError;
use crate::infrastructure::config::Credentials;

type HmacSha512 = Hmac<Sha512>;

pub const KEY_HEADER: &str = "API-Key";
pub const SIGN_HEADER: &str = "API-Sign";

pub struct Signer {
    api_key: String,
    secret: Vec<u8>,
    last_nonce: AtomicU64,
}

impl Signer {
    pub fn new(credentials: &Credentials) -> Result<Self, VenueError> {
        let secret = STANDARD
            .decode(credentials.api_secret().trim())
            .map_err(|e| VenueError::InvalidCredentials(format!("API secret is not base64: {e}")))?;
        Ok(Self {
            api_key: credentials.api_key().to_string(),
            secret,
            last_nonce: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Strictly increasing nonce, microseconds since the epoch.
    pub fn next_nonce(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let mut last = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_nonce
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    pub fn sign(&self, path: &str, nonce: u64, post_data: &str) -> Result<String, VenueError> {
        let mut sha = Sha256::new();
        sha.update(nonce.to_string().as_bytes());
        sha.update(post_data.as_bytes());
        let digest = sha.finalize();

        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|e| VenueError::InvalidCredentials(e.to_string()))?;
        mac.update(path.as_bytes());
        mac.update(&digest);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str =
        "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";

    #[test]
    fn matches_published_signature() {
        let signer = Signer::new(&Credentials::new("key", SECRET)).unwrap();
        let signature = signer
            .sign(
                "/0/private/AddOrder",
                1_616_492_376_594,
                "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
            )
            .unwrap();
        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn nonces_strictly_increase() {
        let signer = Signer::new(&Credentials::new("key", SECRET)).unwrap();
        let mut previous = signer.next_nonce();
        for _ in 0..1000 {
            let next = signer.next_nonce();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn rejects_non_base64_secret() {
        assert!(matches!(
            Signer::new(&Credentials::new("key", "***")),
            Err(VenueError::InvalidCredentials(_))
        ));
    }
}
