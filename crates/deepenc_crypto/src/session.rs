//! Bearer session tokens.
//!
//! Token format: `base64url(claims json) "." base64url(HMAC-SHA256 tag)`.
//! The tag covers the encoded claims exactly as transmitted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Authenticated user id.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Issues and verifies session tokens with a process-wide HMAC key.
pub struct SessionSigner {
    key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionSigner([REDACTED])")
    }
}

impl SessionSigner {
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyEmpty);
        }
        Ok(Self {
            key: Zeroizing::new(secret.to_vec()),
        })
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }

    pub fn issue(&self, user_id: &str, ttl: Duration) -> Result<String, CryptoError> {
        self.issue_at(user_id, Utc::now(), ttl)
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, CryptoError> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{tag}"))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, CryptoError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, CryptoError> {
        let (payload, tag) = token.split_once('.').ok_or(CryptoError::SessionInvalid)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| CryptoError::SessionInvalid)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| CryptoError::SessionInvalid)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CryptoError::SessionInvalid)?;
        let claims: SessionClaims =
            serde_json::from_slice(&raw).map_err(|_| CryptoError::SessionInvalid)?;

        if claims.exp <= now.timestamp() {
            return Err(CryptoError::SessionExpired);
        }
        Ok(claims)
    }
}
