use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key material is empty")]
    KeyEmpty,

    #[error("Plaintext is empty")]
    PlaintextEmpty,

    #[error("Plaintext too short: {actual} bytes, minimum {min}")]
    PlaintextTooShort { min: usize, actual: usize },

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Ciphertext shorter than one nonce")]
    TruncatedCiphertext,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AuthenticationFailed,

    #[error("Decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Session token is malformed or its signature does not verify")]
    SessionInvalid,

    #[error("Session token has expired")]
    SessionExpired,

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
