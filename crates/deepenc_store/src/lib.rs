//! deepenc_store — collaborators of the deepenc engine
//!
//! # Layout
//! - `store`  — the narrow async interfaces the engine consumes
//!   (`UserStore`, `MessageStore`, `Storage`, `StagingCache`)
//! - `models` — row types crossing those interfaces
//! - `memory` — in-process implementations (tests, single-node dev)
//! - `db`     — SQLite implementations via sqlx
//!
//! Stores hold only what the engine hands them: message bodies arrive
//! already encrypted or hashed, account passwords arrive as hashes.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on open.

pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use db::{SqliteStagingCache, SqliteStore};
pub use error::StoreError;
pub use memory::{MemoryStagingCache, MemoryStore};
pub use store::{MessageStore, StagingCache, Storage, UserStore};
