//! Key-committing authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides confidentiality and authenticity with a
//! 24-byte nonce that is safe for random generation. A blake2b commitment to
//! the key is stored in the header and bound into the AEAD associated data,
//! so a ciphertext opens under exactly one key.
//!
//! Layout: `version || nonce || commitment || ciphertext || tag`.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};
use subtle::ConstantTimeEq;

use crate::keys::{DerivedKey, KEY_LENGTH};
use credvault_common::{Error, Result};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Key commitment size (32 bytes).
pub const COMMITMENT_SIZE: usize = KEY_LENGTH;

/// Size of everything in front of the ciphertext.
pub const HEADER_SIZE: usize = 1 + NONCE_SIZE + COMMITMENT_SIZE;

/// Encrypt plaintext under `key`.
///
/// # Postconditions
/// - Returns `version || nonce || commitment || ciphertext || tag`
/// - The nonce is randomly generated for every call
///
/// # Errors
/// - Returns `Crypto` if the cipher fails
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let commitment = key.commitment(&nonce);

    let mut envelope = Vec::with_capacity(HEADER_SIZE + plaintext.len() + TAG_SIZE);
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&commitment);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &envelope[..],
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`seal`].
///
/// # Errors
/// - Returns `Decryption` if the envelope is too short, has an unknown
///   version, was committed to a different key, or fails authentication
///
/// # Security
/// - The commitment is checked in constant time before decrypting
/// - Authenticates before returning any plaintext
pub fn open(key: &DerivedKey, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < HEADER_SIZE + TAG_SIZE {
        return Err(Error::Decryption("Ciphertext too short".to_string()));
    }

    let (header, ciphertext) = envelope.split_at(HEADER_SIZE);
    if header[0] != ENVELOPE_VERSION {
        return Err(Error::Decryption(format!(
            "Unsupported envelope version: {}",
            header[0]
        )));
    }

    let nonce_bytes = &header[1..1 + NONCE_SIZE];
    let stored_commitment = &header[1 + NONCE_SIZE..];

    let expected = key.commitment(nonce_bytes);
    if !bool::from(expected[..].ct_eq(stored_commitment)) {
        return Err(Error::Decryption("Key commitment mismatch".to_string()));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            GenericArray::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| Error::Decryption("Authentication tag mismatch".to_string()))
}
