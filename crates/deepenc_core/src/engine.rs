//! `Engine` — the service facade.
//!
//! Owns the validated configuration, the hasher and the session signer, and
//! drives every message operation through [`MessagePolicy`] and the two
//! collaborators.  Every collaborator call is bounded by
//! `store_timeout_ms`; running out of time is `ServiceError::Internal`.

use std::future::Future;
use std::sync::Arc;

use tokio::time::error::Elapsed;
use tracing::{debug, error, info, warn};

use deepenc_crypto::{CredentialHasher, SessionSigner};
use deepenc_store::{StagingCache, StoreError, Storage};

use crate::config::{ConfigError, ServiceConfig};
use crate::error::ServiceError;
use crate::message::{CorruptMessage, MessageInput, MessageView, StoredMessage};
use crate::policy::MessagePolicy;

const BEARER_PREFIX: &str = "Bearer ";

/// Shared by reference (or `Arc`) across concurrent requests.
pub struct Engine {
    pub(crate) store: Arc<dyn Storage>,
    pub(crate) cache: Arc<dyn StagingCache>,
    pub(crate) config: ServiceConfig,
    pub(crate) hasher: CredentialHasher,
    pub(crate) sessions: SessionSigner,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Validate `config` and wire the collaborators.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn Storage>,
        cache: Arc<dyn StagingCache>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let hasher = config.hashing.build()?;
        let sessions = SessionSigner::new(config.session_secret.as_bytes())
            .map_err(|e| ConfigError::Invalid(format!("session_secret: {e}")))?;
        info!(
            "[engine] ready (store timeout {} ms, public list limit {})",
            config.store_timeout_ms, config.public_list_limit
        );
        Ok(Self {
            store,
            cache,
            config,
            hasher,
            sessions,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn policy(&self) -> MessagePolicy<'_> {
        MessagePolicy::new(self.config.internal_key.as_bytes(), &self.hasher)
    }

    // ── Deadlines ────────────────────────────────────────────────────────────

    /// Run a collaborator call under the configured deadline, leaving the
    /// store error for the caller to interpret.
    pub(crate) async fn within_deadline<T, F>(
        &self,
        fut: F,
    ) -> Result<Result<T, StoreError>, Elapsed>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.config.store_timeout(), fut).await
    }

    /// Run a collaborator call where any failure is a server fault.
    pub(crate) async fn call<T, F>(&self, what: &str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.within_deadline(fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ServiceError::internal(what, e)),
            Err(elapsed) => Err(ServiceError::internal(what, elapsed)),
        }
    }

    /// Fetch and decode a row; a row that does not decode is handed back
    /// so each read path can decide how to report it.
    async fn fetch(
        &self,
        message_id: &str,
    ) -> Result<Option<Result<StoredMessage, CorruptMessage>>, ServiceError> {
        let row = self
            .call("find message", self.store.find_message_by_id(message_id))
            .await?;
        Ok(row.map(StoredMessage::try_from))
    }

    // ── Message operations ───────────────────────────────────────────────────

    /// Validate, encode and persist a new message.  Returns its id.
    pub async fn create_message(
        &self,
        owner_id: &str,
        input: &MessageInput,
    ) -> Result<String, ServiceError> {
        if owner_id.is_empty() {
            return Err(ServiceError::validation("owner id is empty"));
        }
        let encoded = self.policy().validate_and_encode(input)?;
        let encoding = encoded.body.encoding_type();
        let id = self
            .call(
                "insert message",
                self.store.insert_message(encoded.into_new_message(owner_id)),
            )
            .await?;
        info!("[engine] created {encoding} message {id}");
        Ok(id)
    }

    /// Public retrieval by id.  Consumes one-time messages.
    pub async fn read_public_message(&self, message_id: &str) -> Result<MessageView, ServiceError> {
        let stored = match self.fetch(message_id).await? {
            Some(Ok(stored)) => stored,
            Some(Err(corrupt)) => {
                warn!("[engine] {corrupt}");
                return Err(ServiceError::NotFound);
            }
            None => return Err(ServiceError::NotFound),
        };
        let content = self.policy().authorize_public(&stored)?;
        self.finish_read(stored, content).await
    }

    /// Private retrieval by id with an optional caller secret.  Consumes
    /// one-time messages.
    pub async fn read_private_message(
        &self,
        message_id: &str,
        secret: Option<&str>,
    ) -> Result<MessageView, ServiceError> {
        let stored = match self.fetch(message_id).await? {
            Some(Ok(stored)) => stored,
            Some(Err(corrupt)) => return Err(ServiceError::internal("read private message", corrupt)),
            None => return Err(ServiceError::NotFound),
        };
        let content = self.policy().authorize_and_decode(&stored, secret)?;
        self.finish_read(stored, content).await
    }

    /// The owner's read path.  Serves owner-only messages and does not
    /// consume one-time messages.  Someone else's message is `NotFound`.
    pub async fn read_own_message(
        &self,
        owner_id: &str,
        message_id: &str,
        secret: Option<&str>,
    ) -> Result<MessageView, ServiceError> {
        let stored = match self.fetch(message_id).await? {
            Some(Ok(stored)) if stored.owner_id == owner_id => stored,
            Some(Err(corrupt)) => return Err(ServiceError::internal("read own message", corrupt)),
            Some(Ok(_)) | None => return Err(ServiceError::NotFound),
        };
        let content = self.policy().decode_for_owner(&stored, secret)?;
        Ok(stored.into_view(content))
    }

    /// Delete a one-time message after a successful read.
    ///
    /// Losing the delete to a concurrent reader means this read lost: the
    /// other reader got the content.  A failed delete is logged and the read
    /// still succeeds.
    async fn finish_read(
        &self,
        stored: StoredMessage,
        content: String,
    ) -> Result<MessageView, ServiceError> {
        if stored.visibility.is_one_time {
            match self.within_deadline(self.store.delete_message(&stored.id)).await {
                Ok(Ok(true)) => info!("[engine] one-time message {} consumed", stored.id),
                Ok(Ok(false)) => return Err(ServiceError::NotFound),
                Ok(Err(e)) => error!(
                    "[engine] one-time message {} was read but not deleted: {e}",
                    stored.id
                ),
                Err(elapsed) => error!(
                    "[engine] one-time message {} was read but not deleted: {elapsed}",
                    stored.id
                ),
            }
        }
        Ok(stored.into_view(content))
    }

    /// Newest public plaintext messages.  `limit` is clamped to
    /// `1..=public_list_limit`.
    pub async fn list_public_messages(&self, limit: usize) -> Result<Vec<MessageView>, ServiceError> {
        let limit = limit.clamp(1, self.config.public_list_limit);
        let rows = self
            .call("list public messages", self.store.find_recent_public_messages(limit))
            .await?;
        let policy = self.policy();
        Ok(rows
            .into_iter()
            .filter_map(|row| StoredMessage::try_from(row).ok())
            .filter(|stored| !stored.visibility.is_one_time)
            .filter_map(|stored| {
                let content = policy.authorize_public(&stored).ok()?;
                Some(stored.into_view(content))
            })
            .collect())
    }

    /// Every message `owner_id` owns, in stored form.
    pub async fn list_owner_messages(&self, owner_id: &str) -> Result<Vec<MessageView>, ServiceError> {
        let rows = self
            .call("list owner messages", self.store.find_messages_by_owner(owner_id))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match StoredMessage::try_from(row) {
                Ok(stored) => Some(stored.into_stored_view()),
                Err(corrupt) => {
                    warn!("[engine] skipping {corrupt}");
                    None
                }
            })
            .collect())
    }

    /// Replace a message the caller owns.  Re-runs the full write pipeline.
    pub async fn update_message(
        &self,
        owner_id: &str,
        message_id: &str,
        input: &MessageInput,
    ) -> Result<(), ServiceError> {
        self.check_owner(owner_id, message_id).await?;
        let encoded = self.policy().validate_and_encode(input)?;
        let replaced = self
            .call(
                "update message",
                self.store
                    .update_message(message_id, encoded.into_new_message(owner_id)),
            )
            .await?;
        if !replaced {
            return Err(ServiceError::NotFound);
        }
        info!("[engine] updated message {message_id}");
        Ok(())
    }

    pub async fn delete_message(&self, owner_id: &str, message_id: &str) -> Result<(), ServiceError> {
        self.check_owner(owner_id, message_id).await?;
        let deleted = self
            .call("delete message", self.store.delete_message(message_id))
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound);
        }
        info!("[engine] deleted message {message_id}");
        Ok(())
    }

    /// Existence first, then ownership.
    async fn check_owner(&self, owner_id: &str, message_id: &str) -> Result<(), ServiceError> {
        let row = self
            .call("find message", self.store.find_message_by_id(message_id))
            .await?
            .ok_or(ServiceError::NotFound)?;
        if row.owner_id != owner_id {
            debug!("[engine] ownership mismatch on message {message_id}");
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }

    // ── Sessions and lifecycle ───────────────────────────────────────────────

    /// Resolve a bearer session token (with or without the `Bearer ` prefix)
    /// to the owner id it was issued for.
    pub fn authenticate(&self, bearer: &str) -> Result<String, ServiceError> {
        let token = bearer.strip_prefix(BEARER_PREFIX).unwrap_or(bearer).trim();
        self.sessions
            .verify(token)
            .map(|claims| claims.sub)
            .map_err(|e| {
                debug!("[engine] session rejected: {e}");
                ServiceError::Unauthorized
            })
    }

    /// Shut down both collaborators.  Both are attempted even if the first
    /// fails.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let store = self.call("shut down store", self.store.shutdown()).await;
        let cache = self.call("shut down staging cache", self.cache.shutdown()).await;
        store?;
        cache?;
        info!("[engine] shut down");
        Ok(())
    }
}
