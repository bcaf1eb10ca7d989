//! Authenticated encryption for message bodies
//!
//! Uses AES-256-GCM (96-bit nonce).
//! Key: SHA-256 of the caller's key material, so any non-empty passphrase
//! works as a key without manual truncation or padding.
//! Nonce: 12 bytes, random per call.  Tag: 16 bytes.
//!
//! Blob format (base64, standard alphabet):
//!   [ nonce (12 bytes) | ciphertext + tag ]

use aes_gcm::{
    aead::{consts::U12, Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Shortest plaintext `seal` accepts.
pub const MIN_PLAINTEXT_LEN: usize = 16;

/// Normalise arbitrary key material to a 32-byte AES key.
pub fn derive_cipher_key(material: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    if material.is_empty() {
        return Err(CryptoError::KeyEmpty);
    }
    Ok(Zeroizing::new(Sha256::digest(material).into()))
}

/// Encrypt `plaintext` under `key`, returning the base64 blob.
pub fn seal(key: &[u8], plaintext: &str) -> Result<String, CryptoError> {
    let key = derive_cipher_key(key)?;
    if plaintext.is_empty() {
        return Err(CryptoError::PlaintextEmpty);
    }
    if plaintext.len() < MIN_PLAINTEXT_LEN {
        return Err(CryptoError::PlaintextTooShort {
            min: MIN_PLAINTEXT_LEN,
            actual: plaintext.len(),
        });
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::AeadEncrypt)?;

    // Prepend nonce
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Decrypt a blob produced by [`seal`].
pub fn open(key: &[u8], blob: &str) -> Result<String, CryptoError> {
    let key = derive_cipher_key(key)?;
    let data = STANDARD.decode(blob)?;
    if data.len() < NONCE_LEN {
        return Err(CryptoError::TruncatedCiphertext);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = Nonce::<U12>::from_slice(nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::AuthenticationFailed)?;
    let plaintext = cipher
        .decrypt(nonce, ct)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}
