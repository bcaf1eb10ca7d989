//! Service configuration.
//!
//! Built once at startup (TOML file + environment overrides), validated, and
//! then passed by reference to the components that need it.  Secrets live in
//! [`Secret`], which zeroizes on drop and never prints its contents.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

use deepenc_crypto::password::{
    CredentialHasher, DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM,
};

/// Minimum length of the process-wide `internal` encoding key.
pub const MIN_INTERNAL_KEY_LEN: usize = 8;
/// Longest pending-registration lifetime accepted (30 days).
pub const MAX_SIGNUP_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// Longest session lifetime accepted (one year).
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub const ENV_DATABASE_URL: &str = "DEEPENC_DATABASE_URL";
pub const ENV_INTERNAL_KEY: &str = "DEEPENC_INTERNAL_KEY";
pub const ENV_SESSION_SECRET: &str = "DEEPENC_SESSION_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A secret string from configuration.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl HashingConfig {
    pub fn build(&self) -> Result<CredentialHasher, ConfigError> {
        CredentialHasher::new(self.memory_kib, self.iterations, self.parallelism)
            .map_err(|e| ConfigError::Invalid(format!("hashing: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Deadline for every store / cache call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Lifetime of a pending registration; 0 leaves expiry to the cache.
    #[serde(default = "default_signup_ttl_secs")]
    pub signup_ttl_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Upper bound for `list_public_messages`.
    #[serde(default = "default_public_list_limit")]
    pub public_list_limit: usize,
    pub session_secret: Secret,
    /// Process-wide key for the `internal` encoding type.
    pub internal_key: Secret,
    #[serde(default)]
    pub hashing: HashingConfig,
}

fn default_database_url() -> String {
    "sqlite://deepenc.db".into()
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_signup_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_session_ttl_secs() -> u64 {
    60 * 60
}

fn default_public_list_limit() -> usize {
    10
}

impl ServiceConfig {
    /// Defaults for everything except the two secrets.
    pub fn new(internal_key: impl Into<String>, session_secret: impl Into<String>) -> Self {
        Self {
            database_url: default_database_url(),
            store_timeout_ms: default_store_timeout_ms(),
            signup_ttl_secs: default_signup_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            public_list_limit: default_public_list_limit(),
            session_secret: Secret::new(session_secret),
            internal_key: Secret::new(internal_key),
            hashing: HashingConfig::default(),
        }
    }

    /// Read, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Ok(key) = std::env::var(ENV_INTERNAL_KEY) {
            self.internal_key = Secret::new(key);
        }
        if let Ok(secret) = std::env::var(ENV_SESSION_SECRET) {
            self.session_secret = Secret::new(secret);
        }
    }

    /// Must pass before the engine is allowed to serve traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_key.len() < MIN_INTERNAL_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "internal_key must be at least {MIN_INTERNAL_KEY_LEN} bytes"
            )));
        }
        if self.session_secret.is_empty() {
            return Err(ConfigError::Invalid("session_secret is empty".into()));
        }
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid("database_url is empty".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be positive".into()));
        }
        if self.signup_ttl_secs > MAX_SIGNUP_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "signup_ttl_secs must be at most {MAX_SIGNUP_TTL_SECS}"
            )));
        }
        if self.session_ttl_secs == 0 || self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
            )));
        }
        if self.public_list_limit == 0 {
            return Err(ConfigError::Invalid("public_list_limit must be positive".into()));
        }
        self.hashing.build()?;
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn signup_ttl(&self) -> Option<Duration> {
        (self.signup_ttl_secs > 0).then(|| Duration::from_secs(self.signup_ttl_secs))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        let secs = self.session_ttl_secs.min(MAX_SESSION_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }
}
