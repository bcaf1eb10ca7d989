//! Message policy engine.
//!
//! A pure function of `encoding_type`, applied on every write
//! ([`MessagePolicy::validate_and_encode`]) and every read
//! ([`MessagePolicy::authorize_and_decode`] and the public/owner variants).
//!
//! Read-side failures that a caller could provoke by guessing (wrong
//! secret, wrong key, a message on the wrong path) are all `NotFound`.  A
//! failure to open an `internal` message is a server fault and is `Internal`.

use tracing::warn;

use deepenc_crypto::{aead, CredentialHasher};

use crate::error::ServiceError;
use crate::message::{EncodedBody, EncodedMessage, EncodingType, MessageInput, StoredMessage, Visibility};

/// Shortest content the cipher-backed policies accept.
pub const MIN_CONTENT_SIZE: usize = aead::MIN_PLAINTEXT_LEN;
/// Shortest per-message secret or key.
pub const MIN_PASSWORD_SIZE: usize = 8;
/// Longest content any policy accepts.
pub const MAX_CONTENT_SIZE: usize = 2000;

/// Borrowed view of what the policies need: the process-wide key and the
/// credential hasher.
#[derive(Clone, Copy)]
pub struct MessagePolicy<'a> {
    internal_key: &'a [u8],
    hasher: &'a CredentialHasher,
}

impl<'a> MessagePolicy<'a> {
    pub fn new(internal_key: &'a [u8], hasher: &'a CredentialHasher) -> Self {
        Self { internal_key, hasher }
    }

    // ── Write path ───────────────────────────────────────────────────────────

    /// Validate `input` against its declared policy and produce the body to
    /// persist.  Size checks run before any cryptographic work.
    pub fn validate_and_encode(&self, input: &MessageInput) -> Result<EncodedMessage, ServiceError> {
        if input.content.is_empty() {
            return Err(ServiceError::validation("content is empty"));
        }
        if input.content.len() > MAX_CONTENT_SIZE {
            return Err(ServiceError::validation(format!(
                "content exceeds {MAX_CONTENT_SIZE} bytes"
            )));
        }

        let encoding: EncodingType = input.encoding_type.parse()?;
        let body = match encoding {
            EncodingType::Plaintext => {
                if !input.password.is_empty() {
                    return Err(ServiceError::validation(
                        "plaintext messages cannot carry a password",
                    ));
                }
                EncodedBody::Plaintext {
                    content: input.content.clone(),
                }
            }
            EncodingType::Password => {
                require_secret(&input.password)?;
                let hash = self
                    .hasher
                    .hash(&input.password)
                    .map_err(|e| ServiceError::internal("hash message password", e))?;
                EncodedBody::PasswordProtected {
                    content: input.content.clone(),
                    hash,
                }
            }
            EncodingType::Internal => {
                require_sealable(&input.content)?;
                let ciphertext = aead::seal(self.internal_key, &input.content)
                    .map_err(|e| ServiceError::internal("seal internal message", e))?;
                EncodedBody::InternalEncrypted { ciphertext }
            }
            EncodingType::Aes => {
                require_sealable(&input.content)?;
                require_secret(&input.password)?;
                let ciphertext = aead::seal(input.password.as_bytes(), &input.content)
                    .map_err(|e| ServiceError::internal("seal aes message", e))?;
                EncodedBody::KeyEncrypted { ciphertext }
            }
        };

        Ok(EncodedMessage {
            body,
            visibility: Visibility::of(input),
        })
    }

    // ── Read paths ───────────────────────────────────────────────────────────

    /// Public retrieval: plaintext, not private, not owner-only.
    pub fn authorize_public(&self, stored: &StoredMessage) -> Result<String, ServiceError> {
        match &stored.body {
            EncodedBody::Plaintext { content }
                if !stored.is_private && !stored.visibility.only_owner_view =>
            {
                Ok(content.clone())
            }
            _ => Err(ServiceError::NotFound),
        }
    }

    /// Private retrieval with an optional caller secret.
    ///
    /// Plaintext and owner-only messages are never served here.
    pub fn authorize_and_decode(
        &self,
        stored: &StoredMessage,
        secret: Option<&str>,
    ) -> Result<String, ServiceError> {
        if !stored.is_private || stored.visibility.only_owner_view {
            return Err(ServiceError::NotFound);
        }
        match &stored.body {
            EncodedBody::Plaintext { .. } => Err(ServiceError::NotFound),
            EncodedBody::PasswordProtected { content, hash } => {
                let secret = secret.filter(|s| !s.is_empty()).ok_or(ServiceError::NotFound)?;
                if self.hasher.verify(hash, secret) {
                    Ok(content.clone())
                } else {
                    Err(ServiceError::NotFound)
                }
            }
            EncodedBody::InternalEncrypted { ciphertext } => self.open_internal(&stored.id, ciphertext),
            EncodedBody::KeyEncrypted { ciphertext } => open_with_key(&stored.id, ciphertext, secret),
        }
    }

    /// The owner's own read.  Password messages need no secret here; `aes`
    /// messages still need the key, which was never kept.
    pub fn decode_for_owner(
        &self,
        stored: &StoredMessage,
        secret: Option<&str>,
    ) -> Result<String, ServiceError> {
        match &stored.body {
            EncodedBody::Plaintext { content } | EncodedBody::PasswordProtected { content, .. } => {
                Ok(content.clone())
            }
            EncodedBody::InternalEncrypted { ciphertext } => self.open_internal(&stored.id, ciphertext),
            EncodedBody::KeyEncrypted { ciphertext } => open_with_key(&stored.id, ciphertext, secret),
        }
    }

    fn open_internal(&self, id: &str, ciphertext: &str) -> Result<String, ServiceError> {
        aead::open(self.internal_key, ciphertext)
            .map_err(|e| ServiceError::internal(&format!("open internal message {id}"), e))
    }
}

fn open_with_key(id: &str, ciphertext: &str, key: Option<&str>) -> Result<String, ServiceError> {
    let key = key.filter(|k| !k.is_empty()).ok_or(ServiceError::NotFound)?;
    aead::open(key.as_bytes(), ciphertext).map_err(|e| {
        warn!("[policy] aes message {id} did not open: {e}");
        ServiceError::NotFound
    })
}

fn require_secret(secret: &str) -> Result<(), ServiceError> {
    if secret.len() < MIN_PASSWORD_SIZE {
        return Err(ServiceError::validation(format!(
            "password must be at least {MIN_PASSWORD_SIZE} bytes"
        )));
    }
    Ok(())
}

fn require_sealable(content: &str) -> Result<(), ServiceError> {
    if content.len() < MIN_CONTENT_SIZE {
        return Err(ServiceError::validation(format!(
            "content must be at least {MIN_CONTENT_SIZE} bytes for this encoding"
        )));
    }
    Ok(())
}
