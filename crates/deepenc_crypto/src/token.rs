//! Signup token derivation.
//!
//! A signup token addresses a pending registration in the staging cache.
//! It is deterministic in the username and NOT a secret: anyone who knows the
//! username can compute it.  Its only job is indirection for the confirm step.

const SIGNUP_TOKEN_DOMAIN: &[u8] = b"deepenc-signup-token-v1\x00";

/// Hex-encoded BLAKE3 digest of the domain tag and the username.
pub fn signup_token(username: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SIGNUP_TOKEN_DOMAIN);
    hasher.update(username.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_deterministic() {
        assert_eq!(signup_token("alice"), signup_token("alice"));
        assert_eq!(signup_token("alice").len(), 64);
    }

    #[test]
    fn token_is_case_sensitive() {
        assert_ne!(signup_token("alice"), signup_token("Alice"));
        assert_ne!(signup_token("alice"), signup_token("alice "));
    }
}
