//! Key types with secure memory handling.
//!
//! Key material zeroizes its memory on drop and never prints itself.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use credvault_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Salt length used when creating or rotating a vault.
pub const DEFAULT_SALT_LENGTH: usize = 32;

/// Symmetric key derived from the master password.
///
/// Not `PartialEq`; tests compare `as_bytes` explicitly.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Commitment binding this key to a nonce.
    ///
    /// Uses blake2b with a fixed domain label so that a ciphertext can only
    /// ever be opened under the key that produced it.
    pub fn commitment(&self, nonce: &[u8]) -> [u8; KEY_LENGTH] {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(b"credvault-key-commitment-v1");
        hasher.update(self.key);
        hasher.update(nonce);

        let result = hasher.finalize();
        let mut commitment = [0u8; KEY_LENGTH];
        commitment.copy_from_slice(&result);
        commitment
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generate a random salt of [`DEFAULT_SALT_LENGTH`] bytes.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; DEFAULT_SALT_LENGTH];
        fill_random(&mut salt);
        Self(salt)
    }

    /// Generate a random salt of the given length.
    ///
    /// # Errors
    /// - Returns error if `length` is zero
    pub fn generate_with_length(length: usize) -> Result<Self> {
        if length == 0 {
            return Err(Error::Configuration(
                "Salt length must be greater than zero".to_string(),
            ));
        }
        let mut salt = vec![0u8; length];
        fill_random(&mut salt);
        Ok(Self(salt))
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a salt from its persisted text form.
    ///
    /// # Errors
    /// - Returns `Configuration` if the text is not valid base64 or decodes
    ///   to nothing
    pub fn from_encoded(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| Error::Configuration(format!("Malformed salt encoding: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::Configuration("Stored salt is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Encode for storage.
    pub fn to_encoded(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn fill_random(buf: &mut [u8]) {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
}
