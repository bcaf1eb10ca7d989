//! Message model: caller input, the encoded body sum type, stored and
//! outbound representations.
//!
//! The row layout in `deepenc_store` reuses one `password` column for a hash,
//! nothing, or (transiently) a caller key.  Inside the engine that triple is
//! always an [`EncodedBody`], so a plaintext message with a hash or an
//! encrypted message with a stored key cannot be constructed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use deepenc_store::models::{MessageRow, NewMessage};

use crate::error::ServiceError;

// ── Encoding types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingType {
    Plaintext,
    Password,
    Internal,
    Aes,
}

impl EncodingType {
    pub fn as_str(self) -> &'static str {
        match self {
            EncodingType::Plaintext => "plaintext",
            EncodingType::Password => "password",
            EncodingType::Internal => "internal",
            EncodingType::Aes => "aes",
        }
    }
}

impl fmt::Display for EncodingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingType {
    type Err = ServiceError;

    /// Exact, case-sensitive match; there is no fallback type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plaintext" => Ok(EncodingType::Plaintext),
            "password" => Ok(EncodingType::Password),
            "internal" => Ok(EncodingType::Internal),
            "aes" => Ok(EncodingType::Aes),
            other => Err(ServiceError::validation(format!(
                "unknown encoding type {other:?}"
            ))),
        }
    }
}

// ── Caller input ─────────────────────────────────────────────────────────────

/// A message as submitted for create or update.
///
/// `encoding_type` stays a string until validation so that unknown values
/// are a `Validation` error rather than a decode failure.  `password` is the
/// per-message secret (`password`) or key (`aes`); it is wiped on drop.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct MessageInput {
    pub content: String,
    pub encoding_type: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub only_owner_view: bool,
    #[serde(default)]
    pub is_anon: bool,
    #[serde(default)]
    pub is_one_time: bool,
}

impl MessageInput {
    pub fn new(content: impl Into<String>, encoding_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encoding_type: encoding_type.into(),
            password: String::new(),
            only_owner_view: false,
            is_anon: false,
            is_one_time: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn one_time(mut self) -> Self {
        self.is_one_time = true;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.is_anon = true;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.only_owner_view = true;
        self
    }
}

impl fmt::Debug for MessageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageInput")
            .field("content_len", &self.content.len())
            .field("encoding_type", &self.encoding_type)
            .field("password", &"[REDACTED]")
            .field("only_owner_view", &self.only_owner_view)
            .field("is_anon", &self.is_anon)
            .field("is_one_time", &self.is_one_time)
            .finish()
    }
}

// ── Encoded body ─────────────────────────────────────────────────────────────

/// What is persisted for each encoding type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedBody {
    Plaintext { content: String },
    /// Content is stored as submitted; reads are gated by `hash`.
    PasswordProtected { content: String, hash: String },
    /// Sealed with the process-wide key.
    InternalEncrypted { ciphertext: String },
    /// Sealed with a caller key that is not kept.
    KeyEncrypted { ciphertext: String },
}

impl EncodedBody {
    pub fn encoding_type(&self) -> EncodingType {
        match self {
            EncodedBody::Plaintext { .. } => EncodingType::Plaintext,
            EncodedBody::PasswordProtected { .. } => EncodingType::Password,
            EncodedBody::InternalEncrypted { .. } => EncodingType::Internal,
            EncodedBody::KeyEncrypted { .. } => EncodingType::Aes,
        }
    }

    /// Every policy but plaintext makes the message private.
    pub fn is_private(&self) -> bool {
        !matches!(self, EncodedBody::Plaintext { .. })
    }

    /// The stored `content` column, as-is.
    pub fn stored_content(&self) -> &str {
        match self {
            EncodedBody::Plaintext { content } | EncodedBody::PasswordProtected { content, .. } => {
                content
            }
            EncodedBody::InternalEncrypted { ciphertext } | EncodedBody::KeyEncrypted { ciphertext } => {
                ciphertext
            }
        }
    }

    /// Rebuild from the row triple.  `None` for combinations no write can
    /// produce.
    pub fn from_parts(encoding_type: &str, content: String, password: String) -> Option<Self> {
        let encoding = encoding_type.parse::<EncodingType>().ok()?;
        match encoding {
            EncodingType::Plaintext if password.is_empty() => Some(EncodedBody::Plaintext { content }),
            EncodingType::Password if !password.is_empty() => {
                Some(EncodedBody::PasswordProtected { content, hash: password })
            }
            EncodingType::Internal if password.is_empty() => {
                Some(EncodedBody::InternalEncrypted { ciphertext: content })
            }
            EncodingType::Aes if password.is_empty() => {
                Some(EncodedBody::KeyEncrypted { ciphertext: content })
            }
            _ => None,
        }
    }

    /// Flatten to `(content, encoding_type, password)`.
    pub fn into_parts(self) -> (String, &'static str, String) {
        let encoding = self.encoding_type().as_str();
        match self {
            EncodedBody::Plaintext { content } => (content, encoding, String::new()),
            EncodedBody::PasswordProtected { content, hash } => (content, encoding, hash),
            EncodedBody::InternalEncrypted { ciphertext } | EncodedBody::KeyEncrypted { ciphertext } => {
                (ciphertext, encoding, String::new())
            }
        }
    }
}

/// The independent visibility flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    pub only_owner_view: bool,
    pub is_anon: bool,
    pub is_one_time: bool,
}

impl Visibility {
    pub(crate) fn of(input: &MessageInput) -> Self {
        Self {
            only_owner_view: input.only_owner_view,
            is_anon: input.is_anon,
            is_one_time: input.is_one_time,
        }
    }
}

/// Output of the write path, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub body: EncodedBody,
    pub visibility: Visibility,
}

impl EncodedMessage {
    pub fn into_new_message(self, owner_id: &str) -> NewMessage {
        let is_private = self.body.is_private();
        let (content, encoding_type, password) = self.body.into_parts();
        NewMessage {
            owner_id: owner_id.to_string(),
            content,
            is_private,
            encoding_type: encoding_type.to_string(),
            password,
            only_owner_view: self.visibility.only_owner_view,
            is_anon: self.visibility.is_anon,
            is_one_time: self.visibility.is_one_time,
        }
    }
}

// ── Stored messages ──────────────────────────────────────────────────────────

/// A row that does not decode into a valid [`EncodedBody`].
#[derive(Debug, Error)]
#[error("message {id} has an invalid stored encoding ({encoding_type:?})")]
pub struct CorruptMessage {
    pub id: String,
    pub encoding_type: String,
}

/// A message as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub owner_id: String,
    pub body: EncodedBody,
    /// The stored flag, kept separately from `body.is_private()` so rows
    /// written by other tools are still gated on what they say.
    pub is_private: bool,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = CorruptMessage;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let MessageRow {
            id,
            owner_id,
            content,
            is_private,
            encoding_type,
            password,
            only_owner_view,
            is_anon,
            is_one_time,
            created_at,
            updated_at,
        } = row;
        let Some(body) = EncodedBody::from_parts(&encoding_type, content, password) else {
            return Err(CorruptMessage { id, encoding_type });
        };
        Ok(StoredMessage {
            id,
            owner_id,
            body,
            is_private,
            visibility: Visibility {
                only_owner_view,
                is_anon,
                is_one_time,
            },
            created_at,
            updated_at,
        })
    }
}

impl StoredMessage {
    /// Outbound view carrying `content`.  The owner is dropped for
    /// anonymous messages.
    pub fn into_view(self, content: String) -> MessageView {
        MessageView {
            owner_id: (!self.visibility.is_anon).then_some(self.owner_id),
            encoding_type: self.body.encoding_type(),
            id: self.id,
            content,
            is_private: self.is_private,
            only_owner_view: self.visibility.only_owner_view,
            is_anon: self.visibility.is_anon,
            is_one_time: self.visibility.is_one_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// View of the stored representation: ciphertext stays ciphertext and
    /// hashes are never included.
    pub fn into_stored_view(self) -> MessageView {
        let content = self.body.stored_content().to_string();
        self.into_view(content)
    }
}

/// What read operations return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub content: String,
    pub encoding_type: EncodingType,
    pub is_private: bool,
    pub only_owner_view: bool,
    pub is_anon: bool,
    pub is_one_time: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
