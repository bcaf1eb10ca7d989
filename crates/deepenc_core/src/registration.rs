//! Two-phase registration: `Requested -> Pending(token) -> Committed`.
//!
//! `begin_signup` stages `{username, hash}` in the staging cache at a token
//! derived from the username.  `complete_signup` takes the entry out in one
//! atomic step and commits it; the persistent store's unique username is the
//! final word on races between pending signups.

use serde::Serialize;
use tracing::{info, warn};

use deepenc_crypto::token::signup_token;
use deepenc_store::models::{NewUser, PendingSignup};
use deepenc_store::StoreError;

use crate::engine::Engine;
use crate::error::ServiceError;
use crate::policy::MIN_PASSWORD_SIZE;

/// Result of a successful sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub user_id: String,
    pub username: String,
    /// Bearer token for owner operations.
    pub session_token: String,
}

impl Engine {
    /// Stage a candidate account and return the confirmation token.
    pub async fn begin_signup(&self, username: &str, secret: &str) -> Result<String, ServiceError> {
        if username.is_empty() {
            return Err(ServiceError::validation("username is empty"));
        }
        if secret.is_empty() {
            return Err(ServiceError::validation("password is empty"));
        }
        if secret.len() < MIN_PASSWORD_SIZE {
            return Err(ServiceError::validation(format!(
                "password must be at least {MIN_PASSWORD_SIZE} bytes"
            )));
        }

        let existing = self
            .call("find user", self.store.find_user_by_name(username))
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict("username is taken".into()));
        }

        let token = signup_token(username);
        let password_hash = self
            .hasher
            .hash(secret)
            .map_err(|e| ServiceError::internal("hash account password", e))?;
        let record = PendingSignup {
            username: username.to_string(),
            password_hash,
        };

        let staged = self
            .call(
                "stage signup",
                self.cache.put_pending(&token, record, self.config.signup_ttl()),
            )
            .await?;
        if !staged {
            return Err(ServiceError::Conflict("signup already pending".into()));
        }

        info!("[signup] staged pending account for {username}");
        Ok(token)
    }

    /// Consume the pending entry at `token` and commit the account.
    /// Returns the new user id.
    pub async fn complete_signup(&self, token: &str) -> Result<String, ServiceError> {
        if token.is_empty() {
            return Err(ServiceError::NotFound);
        }
        let pending = self
            .call("take pending signup", self.cache.take_pending(token))
            .await?
            .ok_or(ServiceError::NotFound)?;

        let PendingSignup {
            username,
            password_hash,
        } = pending;
        let user = NewUser {
            username: username.clone(),
            password_hash,
        };

        match self.within_deadline(self.store.insert_user(user)).await {
            Ok(Ok(user_id)) => {
                info!("[signup] committed account {username} as {user_id}");
                Ok(user_id)
            }
            Ok(Err(StoreError::Duplicate(_))) => {
                warn!("[signup] {username} was taken before confirmation");
                Err(ServiceError::Conflict("username is taken".into()))
            }
            Ok(Err(e)) => Err(ServiceError::internal("commit account", e)),
            Err(elapsed) => Err(ServiceError::internal("commit account", elapsed)),
        }
    }

    /// Check credentials and issue a session token.
    pub async fn sign_in(&self, username: &str, secret: &str) -> Result<SignIn, ServiceError> {
        if username.is_empty() || secret.is_empty() {
            return Err(ServiceError::validation("username and password are required"));
        }
        let user = self
            .call("find user", self.store.find_user_by_name(username))
            .await?
            .ok_or(ServiceError::NotFound)?;

        if !self.hasher.verify(&user.password_hash, secret) {
            return Err(ServiceError::Unauthorized);
        }

        let session_token = self
            .sessions
            .issue(&user.id, self.config.session_ttl())
            .map_err(|e| ServiceError::internal("issue session", e))?;
        info!("[signin] {} signed in", user.username);
        Ok(SignIn {
            user_id: user.id,
            username: user.username,
            session_token,
        })
    }
}
