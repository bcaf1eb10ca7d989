//! deepenc_core — message policy engine and two-phase registration
//!
//! # Module layout
//! - `message`      — encoding types, caller input, the encoded body sum type, read views
//! - `policy`       — write-time validate/encode and read-time authorise/decode
//! - `engine`       — the `Engine` facade: message operations over the collaborators
//! - `registration` — signup staging, confirmation and sign-in on `Engine`
//! - `config`       — `ServiceConfig`, loaded once at startup and validated
//! - `error`        — `ServiceError`, the caller-facing taxonomy
//!
//! # Anti-oracle rule
//! Failing to authorise a read (wrong secret, wrong key, owner-only message)
//! is reported exactly like a missing message: `ServiceError::NotFound`.

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod policy;
pub mod registration;

pub use config::{ConfigError, HashingConfig, Secret, ServiceConfig};
pub use engine::Engine;
pub use error::ServiceError;
pub use message::{EncodedBody, EncodingType, MessageInput, MessageView};
pub use policy::{MessagePolicy, MAX_CONTENT_SIZE, MIN_CONTENT_SIZE, MIN_PASSWORD_SIZE};
pub use registration::SignIn;
