//! Row models — these map to/from SQL rows and cross the store interfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    /// Unique, case-sensitive.
    pub username: String,
    /// Argon2id PHC string; never the plaintext password.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

/// A message as persisted.  `content`/`password` meaning depends on
/// `encoding_type`; the engine owns that interpretation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub is_private: bool,
    pub encoding_type: String,
    /// Hash for `password` messages, empty otherwise.
    pub password: String,
    pub only_owner_view: bool,
    pub is_anon: bool,
    pub is_one_time: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything in a message row the caller controls; ids and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub owner_id: String,
    pub content: String,
    pub is_private: bool,
    pub encoding_type: String,
    pub password: String,
    pub only_owner_view: bool,
    pub is_anon: bool,
    pub is_one_time: bool,
}

impl NewMessage {
    pub(crate) fn into_row(self, id: String, now: DateTime<Utc>) -> MessageRow {
        MessageRow {
            id,
            owner_id: self.owner_id,
            content: self.content,
            is_private: self.is_private,
            encoding_type: self.encoding_type,
            password: self.password,
            only_owner_view: self.only_owner_view,
            is_anon: self.is_anon,
            is_one_time: self.is_one_time,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A candidate account waiting for confirmation in the staging cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignup {
    pub username: String,
    pub password_hash: String,
}
