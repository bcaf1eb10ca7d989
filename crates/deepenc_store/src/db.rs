//! SQLite implementations via sqlx.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{MessageRow, NewMessage, NewUser, PendingSignup, UserRow};
use crate::store::{MessageStore, StagingCache, Storage, UserStore};

const MESSAGE_COLUMNS: &str = "id, owner_id, content, is_private, encoding_type, password, \
     only_owner_view, is_anon, is_one_time, created_at, updated_at";

/// Persistent store handle.  Cheap to clone (the pool is an Arc internally).
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database named by a `sqlite:` URL.
    /// Runs all pending migrations automatically.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)?;
        Self::connect_with(opts).await
    }

    /// Open (or create) the database file at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        Self::connect_with(SqliteConnectOptions::new().filename(db_path)).await
    }

    async fn connect_with(opts: SqliteConnectOptions) -> Result<Self, StoreError> {
        // WAL + foreign keys are connection settings, not migration statements:
        // SQLite refuses to switch journal_mode inside a transaction.
        let opts = opts
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!("[store] sqlite store ready");
        Ok(Self { pool })
    }

    /// A staging cache sharing this store's pool.
    pub fn staging_cache(&self) -> SqliteStagingCache {
        SqliteStagingCache {
            pool: self.pool.clone(),
        }
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn insert_user(&self, user: NewUser) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, &format!("username {}", user.username)))?;
        Ok(id)
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: NewMessage) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let row = message.into_row(id.clone(), Utc::now());
        sqlx::query(&format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&row.id)
        .bind(&row.owner_id)
        .bind(&row.content)
        .bind(row.is_private)
        .bind(&row.encoding_type)
        .bind(&row.password)
        .bind(row.only_owner_view)
        .bind(row.is_anon)
        .bind(row.is_one_time)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, &format!("message {id}")))?;
        Ok(id)
    }

    async fn find_message_by_id(&self, id: &str) -> Result<Option<MessageRow>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_recent_public_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE encoding_type = 'plaintext' AND is_private = 0 \
               AND only_owner_view = 0 AND is_one_time = 0 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_messages_by_owner(&self, owner_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE owner_id = ? ORDER BY created_at, rowid"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_message(&self, id: &str, message: NewMessage) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET owner_id = ?, content = ?, is_private = ?, encoding_type = ?, \
             password = ?, only_owner_view = ?, is_anon = ?, is_one_time = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&message.owner_id)
        .bind(&message.content)
        .bind(message.is_private)
        .bind(&message.encoding_type)
        .bind(&message.password)
        .bind(message.only_owner_view)
        .bind(message.is_anon)
        .bind(message.is_one_time)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn shutdown(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

// ── Staging cache ────────────────────────────────────────────────────────────

/// Pending registrations kept in the `pending_signups` table.
#[derive(Clone)]
pub struct SqliteStagingCache {
    pool: SqlitePool,
}

impl SqliteStagingCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete expired rows.  Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM pending_signups WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StagingCache for SqliteStagingCache {
    async fn put_pending(
        &self,
        token: &str,
        record: PendingSignup,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(
                now + chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::days(365)),
            ),
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        // An expired row no longer blocks the token.
        sqlx::query(
            "DELETE FROM pending_signups \
             WHERE token = ? AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(token)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO pending_signups (token, username, password_hash, expires_at) \
             VALUES (?, ?, ?, ?) ON CONFLICT(token) DO NOTHING",
        )
        .bind(token)
        .bind(&record.username)
        .bind(&record.password_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected() == 1)
    }

    async fn take_pending(&self, token: &str) -> Result<Option<PendingSignup>, StoreError> {
        // Single statement: the row is gone for every other caller the
        // moment one of them reads it.
        let taken = sqlx::query_as::<_, (String, String, Option<DateTime<Utc>>)>(
            "DELETE FROM pending_signups WHERE token = ? \
             RETURNING username, password_hash, expires_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken.and_then(|(username, password_hash, expires_at)| {
            match expires_at {
                Some(at) if at <= Utc::now() => None,
                _ => Some(PendingSignup {
                    username,
                    password_hash,
                }),
            }
        }))
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn message(owner: &str) -> NewMessage {
        NewMessage {
            owner_id: owner.into(),
            content: "stored content".into(),
            is_private: false,
            encoding_type: "plaintext".into(),
            password: String::new(),
            only_owner_view: false,
            is_anon: true,
            is_one_time: false,
        }
    }

    fn pending(name: &str) -> PendingSignup {
        PendingSignup {
            username: name.into(),
            password_hash: "$argon2id$fake".into(),
        }
    }

    #[tokio::test]
    async fn users_roundtrip_and_stay_unique() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).await.unwrap();

        let id = store
            .insert_user(NewUser {
                username: "alice".into(),
                password_hash: "h1".into(),
            })
            .await
            .unwrap();
        let found = store.find_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.password_hash, "h1");

        let dup = store
            .insert_user(NewUser {
                username: "alice".into(),
                password_hash: "h2".into(),
            })
            .await;
        assert!(matches!(dup, Err(StoreError::Duplicate(_))));
        assert!(store.find_user_by_name("ALICE").await.unwrap().is_none());
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn messages_crud() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).await.unwrap();

        let a = store.insert_message(message("u1")).await.unwrap();
        let b = store.insert_message(message("u1")).await.unwrap();
        let mut hidden = message("u2");
        hidden.only_owner_view = true;
        store.insert_message(hidden).await.unwrap();

        let row = store.find_message_by_id(&a).await.unwrap().unwrap();
        assert_eq!(row.owner_id, "u1");
        assert!(row.is_anon);

        let recent = store.find_recent_public_messages(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, b);

        assert_eq!(store.find_messages_by_owner("u1").await.unwrap().len(), 2);
        assert_eq!(store.find_messages_by_owner("u2").await.unwrap().len(), 1);

        let mut changed = message("u1");
        changed.content = "changed".into();
        assert!(store.update_message(&a, changed).await.unwrap());
        let row = store.find_message_by_id(&a).await.unwrap().unwrap();
        assert_eq!(row.content, "changed");

        assert!(store.delete_message(&a).await.unwrap());
        assert!(!store.delete_message(&a).await.unwrap());
        assert!(store.find_message_by_id(&a).await.unwrap().is_none());
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn pending_take_is_single_use() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).await.unwrap();
        let cache = store.staging_cache();

        assert!(cache.put_pending("tok", pending("alice"), None).await.unwrap());
        assert!(!cache.put_pending("tok", pending("mallory"), None).await.unwrap());

        let (first, second) = tokio::join!(cache.take_pending("tok"), cache.take_pending("tok"));
        let winners = [first.unwrap(), second.unwrap()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        assert_eq!(winners, vec![pending("alice")]);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn pending_expiry_is_enforced() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).await.unwrap();
        let cache = store.staging_cache();

        let ttl = Some(Duration::from_millis(10));
        assert!(cache.put_pending("tok", pending("alice"), ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.take_pending("tok").await.unwrap(), None);

        assert!(cache.put_pending("old", pending("bob"), ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.put_pending("old", pending("carol"), None).await.unwrap());
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.take_pending("old").await.unwrap(), Some(pending("carol")));
        store.shutdown().await.unwrap();
    }
}
