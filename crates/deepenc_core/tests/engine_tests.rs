//! Engine behaviour over the in-memory collaborators.
//!
//! Covers:
//!  1. Round trips for every encoding type, wrong secrets read as missing
//!  2. What actually lands in the store
//!  3. One-time consumption, including concurrent readers
//!  4. Anonymity and owner-only visibility
//!  5. Ownership on update/delete
//!  6. Size boundaries
//!  7. Deadlines and failing collaborators

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deepenc_core::{Engine, EncodingType, HashingConfig, MessageInput, ServiceConfig, ServiceError};
use deepenc_store::models::{MessageRow, NewMessage, NewUser, UserRow};
use deepenc_store::{
    MemoryStagingCache, MemoryStore, MessageStore, StoreError, Storage, UserStore,
};

const INTERNAL_KEY: &str = "internal-test-key";

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::new(INTERNAL_KEY, "session-test-secret");
    config.hashing = HashingConfig {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    };
    config
}

fn engine_over(store: Arc<dyn Storage>, config: ServiceConfig) -> Engine {
    Engine::new(config, store, Arc::new(MemoryStagingCache::new())).unwrap()
}

fn memory_engine() -> (Engine, MemoryStore) {
    let store = MemoryStore::new();
    (engine_over(Arc::new(store.clone()), test_config()), store)
}

async fn stored_row(store: &MemoryStore, id: &str) -> MessageRow {
    store.find_message_by_id(id).await.unwrap().unwrap()
}

// ── Round trips ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn plaintext_is_served_publicly() {
    let (engine, _) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("hello, world", "plaintext"))
        .await
        .unwrap();

    let view = engine.read_public_message(&id).await.unwrap();
    assert_eq!(view.content, "hello, world");
    assert_eq!(view.owner_id.as_deref(), Some("u1"));
    assert_eq!(view.encoding_type, EncodingType::Plaintext);
    assert!(!view.is_private);

    assert_eq!(
        engine.read_private_message(&id, None).await,
        Err(ServiceError::NotFound)
    );
}

#[tokio::test]
async fn password_message_needs_the_secret() {
    let (engine, _) = memory_engine();
    let input = MessageInput::new("the vault code is 4321", "password").with_password("hunter22");
    let id = engine.create_message("u1", &input).await.unwrap();

    let view = engine.read_private_message(&id, Some("hunter22")).await.unwrap();
    assert_eq!(view.content, "the vault code is 4321");
    assert!(view.is_private);

    let wrong = engine.read_private_message(&id, Some("hunter2")).await;
    let missing = engine.read_private_message("no-such-id", Some("hunter22")).await;
    assert_eq!(wrong, Err(ServiceError::NotFound));
    assert_eq!(wrong, missing);
    assert_eq!(engine.read_public_message(&id).await, Err(ServiceError::NotFound));
}

#[tokio::test]
async fn internal_message_roundtrip() {
    let (engine, store) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("hello world!!!!!", "internal"))
        .await
        .unwrap();

    let row = stored_row(&store, &id).await;
    assert_ne!(row.content, "hello world!!!!!");
    assert!(row.password.is_empty());
    assert!(row.is_private);

    let view = engine.read_private_message(&id, None).await.unwrap();
    assert_eq!(view.content, "hello world!!!!!");
    let own = engine.read_own_message("u1", &id, None).await.unwrap();
    assert_eq!(own.content, "hello world!!!!!");
}

#[tokio::test]
async fn fifteen_byte_internal_content_is_too_short() {
    let (engine, store) = memory_engine();
    assert_eq!("hello world!!!!".len(), 15);
    let result = engine
        .create_message("u1", &MessageInput::new("hello world!!!!", "internal"))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
    assert_eq!(store.message_count(), 0);
}

#[tokio::test]
async fn aes_message_needs_the_key() {
    let (engine, store) = memory_engine();
    let input = MessageInput::new("launch at dawn, not dusk", "aes").with_password("correct horse");
    let id = engine.create_message("u1", &input).await.unwrap();

    let row = stored_row(&store, &id).await;
    assert!(row.password.is_empty());
    assert!(!row.content.contains("launch"));
    assert!(!row.content.contains("correct horse"));

    let view = engine
        .read_private_message(&id, Some("correct horse"))
        .await
        .unwrap();
    assert_eq!(view.content, "launch at dawn, not dusk");

    let wrong = engine.read_private_message(&id, Some("battery staple")).await;
    let missing = engine.read_private_message("no-such-id", Some("correct horse")).await;
    assert_eq!(wrong, Err(ServiceError::NotFound));
    assert_eq!(wrong, missing);
}

#[tokio::test]
async fn plaintext_with_password_never_reaches_the_store() {
    let (engine, store) = memory_engine();
    let input = MessageInput::new("hello there", "plaintext").with_password("oops");
    assert!(matches!(
        engine.create_message("u1", &input).await,
        Err(ServiceError::Validation(_))
    ));
    let unknown = MessageInput::new("hello there", "rot13");
    assert!(matches!(
        engine.create_message("u1", &unknown).await,
        Err(ServiceError::Validation(_))
    ));
    assert_eq!(store.message_count(), 0);
}

// ── One-time messages ────────────────────────────────────────────────────────

#[tokio::test]
async fn one_time_private_message_is_read_once() {
    let (engine, store) = memory_engine();
    let input = MessageInput::new("self destructing note", "password")
        .with_password("hunter22")
        .one_time();
    let id = engine.create_message("u1", &input).await.unwrap();

    // A failed attempt does not consume it.
    assert_eq!(
        engine.read_private_message(&id, Some("wrong-pass")).await,
        Err(ServiceError::NotFound)
    );
    assert_eq!(store.message_count(), 1);

    let first = engine.read_private_message(&id, Some("hunter22")).await.unwrap();
    assert_eq!(first.content, "self destructing note");
    assert_eq!(
        engine.read_private_message(&id, Some("hunter22")).await,
        Err(ServiceError::NotFound)
    );
    assert_eq!(store.message_count(), 0);
}

#[tokio::test]
async fn one_time_public_message_is_read_once_and_never_listed() {
    let (engine, _) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("blink and miss it", "plaintext").one_time())
        .await
        .unwrap();

    assert!(engine.list_public_messages(10).await.unwrap().is_empty());
    assert!(engine.read_public_message(&id).await.is_ok());
    assert_eq!(engine.read_public_message(&id).await, Err(ServiceError::NotFound));
}

#[tokio::test]
async fn owner_read_does_not_consume() {
    let (engine, _) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("hello world!!!!!", "internal").one_time())
        .await
        .unwrap();
    engine.read_own_message("u1", &id, None).await.unwrap();
    engine.read_own_message("u1", &id, None).await.unwrap();
    assert!(engine.read_private_message(&id, None).await.is_ok());
    assert_eq!(
        engine.read_own_message("u1", &id, None).await,
        Err(ServiceError::NotFound)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_one_time_reads_succeed_once() {
    let (engine, _) = memory_engine();
    let engine = Arc::new(engine);
    let id = engine
        .create_message("u1", &MessageInput::new("hello world!!!!!", "internal").one_time())
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            tokio::spawn(async move { engine.read_private_message(&id, None).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(view) => {
                assert_eq!(view.content, "hello world!!!!!");
                successes += 1;
            }
            Err(err) => assert_eq!(err, ServiceError::NotFound),
        }
    }
    assert_eq!(successes, 1);
}

// ── Visibility ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_messages_never_reveal_the_owner() {
    let (engine, _) = memory_engine();
    let plain = engine
        .create_message("u1", &MessageInput::new("who said this?", "plaintext").anonymous())
        .await
        .unwrap();
    let sealed = engine
        .create_message(
            "u1",
            &MessageInput::new("who sealed this one?", "aes")
                .with_password("passphrase")
                .anonymous(),
        )
        .await
        .unwrap();

    assert_eq!(engine.read_public_message(&plain).await.unwrap().owner_id, None);
    let listed = engine.list_public_messages(10).await.unwrap();
    assert!(listed.iter().all(|m| m.owner_id.is_none()));
    let view = engine
        .read_private_message(&sealed, Some("passphrase"))
        .await
        .unwrap();
    assert_eq!(view.owner_id, None);
    assert!(!serde_json::to_string(&view).unwrap().contains("u1"));
}

#[tokio::test]
async fn owner_only_messages_stay_off_shared_paths() {
    let (engine, _) = memory_engine();
    let id = engine
        .create_message(
            "u1",
            &MessageInput::new("just for me, thanks", "password")
                .with_password("hunter22")
                .owner_only(),
        )
        .await
        .unwrap();

    assert_eq!(
        engine.read_private_message(&id, Some("hunter22")).await,
        Err(ServiceError::NotFound)
    );
    assert_eq!(
        engine.read_own_message("u2", &id, None).await,
        Err(ServiceError::NotFound)
    );
    let own = engine.read_own_message("u1", &id, None).await.unwrap();
    assert_eq!(own.content, "just for me, thanks");
}

#[tokio::test]
async fn public_listing_is_newest_first_and_clamped() {
    let mut config = test_config();
    config.public_list_limit = 3;
    let engine = engine_over(Arc::new(MemoryStore::new()), config);

    let mut ids = Vec::new();
    for n in 0..5 {
        let id = engine
            .create_message("u1", &MessageInput::new(format!("public note {n}"), "plaintext"))
            .await
            .unwrap();
        ids.push(id);
    }
    engine
        .create_message("u1", &MessageInput::new("hello world!!!!!", "internal"))
        .await
        .unwrap();

    let listed = engine.list_public_messages(100).await.unwrap();
    let listed_ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(listed_ids, vec![ids[4].as_str(), ids[3].as_str(), ids[2].as_str()]);

    assert_eq!(engine.list_public_messages(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn owner_listing_shows_stored_form_only() {
    let (engine, _) = memory_engine();
    engine
        .create_message(
            "u1",
            &MessageInput::new("the vault code is 4321", "password").with_password("hunter22"),
        )
        .await
        .unwrap();
    engine
        .create_message(
            "u1",
            &MessageInput::new("launch at dawn, not dusk", "aes").with_password("correct horse"),
        )
        .await
        .unwrap();
    engine
        .create_message("u2", &MessageInput::new("someone else's", "plaintext"))
        .await
        .unwrap();

    let mine = engine.list_owner_messages("u1").await.unwrap();
    assert_eq!(mine.len(), 2);
    let json = serde_json::to_string(&mine).unwrap();
    assert!(!json.contains("argon2"));
    assert!(!json.contains("launch at dawn"));
    assert!(!json.contains("correct horse"));
}

// ── Ownership ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_reruns_the_policy_and_checks_ownership() {
    let (engine, store) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("first draft", "plaintext"))
        .await
        .unwrap();

    let sealed = MessageInput::new("second draft, sealed", "aes").with_password("correct horse");
    assert_eq!(
        engine.update_message("u2", &id, &sealed).await,
        Err(ServiceError::Forbidden)
    );
    assert_eq!(
        engine.update_message("u1", "no-such-id", &sealed).await,
        Err(ServiceError::NotFound)
    );
    let invalid = MessageInput::new("x", "internal");
    assert!(matches!(
        engine.update_message("u1", &id, &invalid).await,
        Err(ServiceError::Validation(_))
    ));

    engine.update_message("u1", &id, &sealed).await.unwrap();
    let row = stored_row(&store, &id).await;
    assert_eq!(row.encoding_type, "aes");
    assert!(row.is_private);
    assert!(row.password.is_empty());

    // Once sealed it is gone from the public path for good.
    assert_eq!(engine.read_public_message(&id).await, Err(ServiceError::NotFound));
    let view = engine
        .read_private_message(&id, Some("correct horse"))
        .await
        .unwrap();
    assert_eq!(view.content, "second draft, sealed");
}

#[tokio::test]
async fn delete_checks_existence_then_ownership() {
    let (engine, store) = memory_engine();
    let id = engine
        .create_message("u1", &MessageInput::new("delete me later", "plaintext"))
        .await
        .unwrap();

    assert_eq!(engine.delete_message("u2", &id).await, Err(ServiceError::Forbidden));
    assert_eq!(
        engine.delete_message("u2", "no-such-id").await,
        Err(ServiceError::NotFound)
    );
    engine.delete_message("u1", &id).await.unwrap();
    assert_eq!(store.message_count(), 0);
    assert_eq!(engine.delete_message("u1", &id).await, Err(ServiceError::NotFound));
}

// ── Boundaries ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn content_and_secret_boundaries() {
    let (engine, _) = memory_engine();

    let max = "m".repeat(2000);
    assert!(engine
        .create_message("u1", &MessageInput::new(max.clone(), "internal"))
        .await
        .is_ok());
    assert!(matches!(
        engine
            .create_message("u1", &MessageInput::new(format!("{max}m"), "internal"))
            .await,
        Err(ServiceError::Validation(_))
    ));

    for encoding in ["password", "aes"] {
        let at_min = MessageInput::new("exactly sixteen!", encoding).with_password("8 bytes!");
        let below = MessageInput::new("exactly sixteen!", encoding).with_password("7 bytes");
        assert!(engine.create_message("u1", &at_min).await.is_ok(), "{encoding}");
        assert!(
            matches!(
                engine.create_message("u1", &below).await,
                Err(ServiceError::Validation(_))
            ),
            "{encoding}"
        );
    }

    assert!(matches!(
        engine
            .create_message("u1", &MessageInput::new("", "plaintext"))
            .await,
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        engine
            .create_message("", &MessageInput::new("no owner given", "plaintext"))
            .await,
        Err(ServiceError::Validation(_))
    ));
}

// ── Failing collaborators ────────────────────────────────────────────────────

/// Wraps a `MemoryStore`, optionally stalling reads or failing deletes.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    stall_reads: bool,
    fail_deletes: bool,
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn insert_user(&self, user: NewUser) -> Result<String, StoreError> {
        self.inner.insert_user(user).await
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.inner.find_user_by_name(username).await
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert_message(&self, message: NewMessage) -> Result<String, StoreError> {
        self.inner.insert_message(message).await
    }

    async fn find_message_by_id(&self, id: &str) -> Result<Option<MessageRow>, StoreError> {
        if self.stall_reads {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.find_message_by_id(id).await
    }

    async fn find_recent_public_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.inner.find_recent_public_messages(limit).await
    }

    async fn find_messages_by_owner(&self, owner_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        self.inner.find_messages_by_owner(owner_id).await
    }

    async fn update_message(&self, id: &str, message: NewMessage) -> Result<bool, StoreError> {
        self.inner.update_message(id, message).await
    }

    async fn delete_message(&self, id: &str) -> Result<bool, StoreError> {
        if self.fail_deletes {
            return Err(StoreError::Closed);
        }
        self.inner.delete_message(id).await
    }
}

#[async_trait]
impl Storage for FlakyStore {
    async fn shutdown(&self) -> Result<(), StoreError> {
        self.inner.shutdown().await
    }
}

#[tokio::test]
async fn slow_store_is_an_internal_error() {
    let store = FlakyStore {
        stall_reads: true,
        ..FlakyStore::default()
    };
    let mut config = test_config();
    config.store_timeout_ms = 50;
    let engine = engine_over(Arc::new(store), config);

    let id = engine
        .create_message("u1", &MessageInput::new("hello world!!!!!", "internal"))
        .await
        .unwrap();
    assert_eq!(
        engine.read_private_message(&id, None).await,
        Err(ServiceError::Internal)
    );
    assert_eq!(
        engine.delete_message("u1", &id).await,
        Err(ServiceError::Internal)
    );
}

#[tokio::test]
async fn failed_one_time_delete_still_serves_the_read() {
    let store = FlakyStore {
        fail_deletes: true,
        ..FlakyStore::default()
    };
    let engine = engine_over(Arc::new(store.clone()), test_config());
    let id = engine
        .create_message("u1", &MessageInput::new("read me once please", "plaintext").one_time())
        .await
        .unwrap();

    let view = engine.read_public_message(&id).await.unwrap();
    assert_eq!(view.content, "read me once please");
    assert_eq!(store.inner.message_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_the_store() {
    let (engine, _) = memory_engine();
    engine.shutdown().await.unwrap();
    assert_eq!(
        engine
            .create_message("u1", &MessageInput::new("too late now", "plaintext"))
            .await,
        Err(ServiceError::Internal)
    );
}
