//! Interfaces the engine consumes.
//!
//! All methods are async to support I/O-bound backends.  Deadlines are the
//! caller's concern; implementations must tolerate being dropped mid-call.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{MessageRow, NewMessage, NewUser, PendingSignup, UserRow};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a committed account.  Returns the new user id.
    ///
    /// Fails with [`StoreError::Duplicate`] if the username is taken; this is
    /// the final authority on username uniqueness.
    async fn insert_user(&self, user: NewUser) -> Result<String, StoreError>;

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRow>, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message and return its store-assigned id.
    async fn insert_message(&self, message: NewMessage) -> Result<String, StoreError>;

    async fn find_message_by_id(&self, id: &str) -> Result<Option<MessageRow>, StoreError>;

    /// Newest-first public plaintext messages, at most `limit`.
    ///
    /// Public means `encoding_type = "plaintext"`, not private, not owner-only
    /// and not one-time.
    async fn find_recent_public_messages(&self, limit: usize)
        -> Result<Vec<MessageRow>, StoreError>;

    async fn find_messages_by_owner(&self, owner_id: &str) -> Result<Vec<MessageRow>, StoreError>;

    /// Replace every caller-controlled field of message `id`.
    /// Returns `false` if no such message exists.
    async fn update_message(&self, id: &str, message: NewMessage) -> Result<bool, StoreError>;

    /// Returns `false` if no such message exists.
    async fn delete_message(&self, id: &str) -> Result<bool, StoreError>;
}

/// The persistent store: users + messages + lifecycle.
#[async_trait]
pub trait Storage: UserStore + MessageStore {
    async fn shutdown(&self) -> Result<(), StoreError>;
}

/// Short-lived key-value store holding pending registrations.
#[async_trait]
pub trait StagingCache: Send + Sync {
    /// Store `record` at `token` unless a live entry already exists there.
    ///
    /// Returns `false` (and leaves the existing entry untouched) if the token
    /// is already pending.  `ttl = None` keeps the entry until taken.
    async fn put_pending(
        &self,
        token: &str,
        record: PendingSignup,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Atomically fetch and remove the entry at `token`.
    ///
    /// Of any number of concurrent callers for the same token, at most one
    /// receives `Some`.  Expired entries are reported as `None`.
    async fn take_pending(&self, token: &str) -> Result<Option<PendingSignup>, StoreError>;

    async fn shutdown(&self) -> Result<(), StoreError>;
}
