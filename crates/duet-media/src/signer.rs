use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::MediaError;
use crate::path::{MEDIA_ROUTE_PREFIX, parse_object_path};

type HmacSha256 = Hmac<Sha256>;

/// A time-limited URL for a private object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at - margin > now
    }
}

/// Signs object paths into `{base}/media/{path}?expires={unix}&sig={hex}`.
///
/// `sig` is HMAC-SHA256 over `"{path}\n{expires}"`.
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            secret: secret.as_ref().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, path: &str, expires: i64) -> Result<HmacSha256, MediaError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| MediaError::Signing(e.to_string()))?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Sign `path` for access until `expires_at`.
    pub fn sign_until(&self, path: &str, expires_at: DateTime<Utc>) -> Result<SignedUrl, MediaError> {
        parse_object_path(path)?;
        let expires = expires_at.timestamp();
        let sig = hex::encode(self.mac(path, expires)?.finalize().into_bytes());
        Ok(SignedUrl {
            url: format!(
                "{}/{}{}?expires={}&sig={}",
                self.base_url, MEDIA_ROUTE_PREFIX, path, expires, sig
            ),
            expires_at,
        })
    }

    /// Check a presented signature. Expiry is checked first so stale links
    /// report `Expired` rather than `InvalidSignature`.
    pub fn verify(&self, path: &str, expires: i64, sig: &str, now: DateTime<Utc>) -> Result<(), MediaError> {
        if expires <= now.timestamp() {
            return Err(MediaError::Expired);
        }
        let presented = hex::decode(sig).map_err(|_| MediaError::InvalidSignature)?;
        self.mac(path, expires)?
            .verify_slice(&presented)
            .map_err(|_| MediaError::InvalidSignature)
    }
}
