//! Text envelopes for secrets stored as string fields.
//!
//! Secrets live in records as base64 text of an [`aead`](crate::aead)
//! envelope. These helpers are what the vault uses for every secret field
//! and for the canary.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::aead::{open, seal};
use crate::keys::DerivedKey;
use credvault_common::{Error, Result, SensitiveString};

/// Encrypt a string under `key` and encode it for storage.
///
/// Encrypting the same plaintext twice yields different text.
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<String> {
    let envelope = seal(key, plaintext.as_bytes())?;
    Ok(STANDARD.encode(envelope))
}

/// Decode and decrypt a stored secret.
///
/// # Errors
/// - Returns `Decryption` for malformed text, a wrong key, tampered data, or
///   a plaintext that is not UTF-8
pub fn decrypt(ciphertext: &str, key: &DerivedKey) -> Result<SensitiveString> {
    let envelope = STANDARD
        .decode(ciphertext.trim())
        .map_err(|_| Error::Decryption("Malformed ciphertext encoding".to_string()))?;
    let plaintext = open(key, &envelope)?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| Error::Decryption("Decrypted value is not valid UTF-8".to_string()))?;
    Ok(SensitiveString::new(text))
}
