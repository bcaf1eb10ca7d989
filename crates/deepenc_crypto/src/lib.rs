//! deepenc_crypto — cryptographic primitives for the deepenc message service
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Secret material is zeroized on drop and never appears in `Debug` output.
//! - Failures are typed so callers can collapse them deliberately at their
//!   own boundary.
//!
//! # Module layout
//! - `aead`     — AES-256-GCM seal/open over passphrase-derived keys (base64 blobs)
//! - `password` — Argon2id PHC hashing for account and message secrets
//! - `token`    — deterministic signup token derivation (BLAKE3)
//! - `session`  — HMAC-SHA256 bearer session tokens
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod password;
pub mod session;
pub mod token;

pub use error::CryptoError;
pub use password::CredentialHasher;
pub use session::{SessionClaims, SessionSigner};
