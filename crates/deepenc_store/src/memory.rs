//! In-memory implementations of the store interfaces.
//!
//! Every operation runs inside a single lock section, so `take_pending`
//! and insert-if-absent semantics hold under concurrent callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{MessageRow, NewMessage, NewUser, PendingSignup, UserRow};
use crate::store::{MessageStore, StagingCache, Storage, UserStore};

// ── Persistent store ─────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreInner {
    /// Keyed by username.
    users: HashMap<String, UserRow>,
    /// Keyed by message id; the `u64` is insertion order for "recent" queries.
    messages: HashMap<String, (u64, MessageRow)>,
    next_seq: u64,
}

/// Store handle.  Cheap to clone (Arc internally).
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    pub fn message_count(&self) -> usize {
        self.inner.read().messages.len()
    }
}

fn is_public(row: &MessageRow) -> bool {
    row.encoding_type == "plaintext" && !row.is_private && !row.only_owner_view && !row.is_one_time
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<String, StoreError> {
        self.check_open()?;
        let mut inner = self.inner.write();
        if inner.users.contains_key(&user.username) {
            return Err(StoreError::Duplicate(format!("username {}", user.username)));
        }
        let id = Uuid::new_v4().simple().to_string();
        let row = UserRow {
            id: id.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        inner.users.insert(user.username, row);
        Ok(id)
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.check_open()?;
        Ok(self.inner.read().users.get(username).cloned())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: NewMessage) -> Result<String, StoreError> {
        self.check_open()?;
        let id = Uuid::new_v4().simple().to_string();
        let row = message.into_row(id.clone(), Utc::now());
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.insert(id.clone(), (seq, row));
        Ok(id)
    }

    async fn find_message_by_id(&self, id: &str) -> Result<Option<MessageRow>, StoreError> {
        self.check_open()?;
        Ok(self.inner.read().messages.get(id).map(|(_, row)| row.clone()))
    }

    async fn find_recent_public_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.check_open()?;
        let inner = self.inner.read();
        let mut public: Vec<&(u64, MessageRow)> =
            inner.messages.values().filter(|(_, row)| is_public(row)).collect();
        public.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(public.into_iter().take(limit).map(|(_, row)| row.clone()).collect())
    }

    async fn find_messages_by_owner(&self, owner_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        self.check_open()?;
        let inner = self.inner.read();
        let mut owned: Vec<&(u64, MessageRow)> = inner
            .messages
            .values()
            .filter(|(_, row)| row.owner_id == owner_id)
            .collect();
        owned.sort_by_key(|(seq, _)| *seq);
        Ok(owned.into_iter().map(|(_, row)| row.clone()).collect())
    }

    async fn update_message(&self, id: &str, message: NewMessage) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut inner = self.inner.write();
        match inner.messages.get_mut(id) {
            Some((_, row)) => {
                let created_at = row.created_at;
                let mut updated = message.into_row(id.to_string(), Utc::now());
                updated.created_at = created_at;
                *row = updated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.inner.write().messages.remove(id).is_some())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn shutdown(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── Staging cache ────────────────────────────────────────────────────────────

struct PendingEntry {
    record: PendingSignup,
    expires_at: Option<Instant>,
}

impl PendingEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStagingCache {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStagingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Drop expired entries.  Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl StagingCache for MemoryStagingCache {
    async fn put_pending(
        &self,
        token: &str,
        record: PendingSignup,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_open()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(token).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            token.to_string(),
            PendingEntry {
                record,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn take_pending(&self, token: &str) -> Result<Option<PendingSignup>, StoreError> {
        self.check_open()?;
        let entry = self.entries.lock().remove(token);
        Ok(entry
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.record))
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.entries.lock().clear();
        Ok(())
    }
}
