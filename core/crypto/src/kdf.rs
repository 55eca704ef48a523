//! Password-based key derivation.
//!
//! Vaults default to PBKDF2-HMAC-SHA256 with 100 000 iterations. Argon2id is
//! available as a memory-hard alternative. The chosen algorithm and its cost
//! parameters are stored next to the salt so that changing the defaults
//! never strands an existing vault.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{DerivedKey, Salt, KEY_LENGTH};
use credvault_common::{Error, Result};

/// Iteration count used for PBKDF2 when nothing else is configured.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Algorithm identifier and cost parameters for key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    /// PBKDF2 with HMAC-SHA256.
    Pbkdf2Sha256 {
        /// Number of HMAC iterations.
        iterations: u32,
    },
    /// Argon2id, version 0x13.
    Argon2id {
        /// Memory cost in KiB (e.g., 65536 = 64 MiB).
        memory_cost: u32,
        /// Number of iterations.
        time_cost: u32,
        /// Degree of parallelism.
        parallelism: u32,
    },
}

impl KdfParams {
    /// PBKDF2-HMAC-SHA256 with the given iteration count.
    pub fn pbkdf2(iterations: u32) -> Self {
        Self::Pbkdf2Sha256 { iterations }
    }

    /// Argon2id parameters suitable for interactive use.
    ///
    /// Targets roughly 0.5-1 second of derivation time.
    pub fn interactive() -> Self {
        Self::Argon2id {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Argon2id parameters for constrained machines.
    pub fn moderate() -> Self {
        Self::Argon2id {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Short identifier of the algorithm.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Pbkdf2Sha256 { .. } => "pbkdf2-sha256",
            Self::Argon2id { .. } => "argon2id",
        }
    }

    /// Serialize for storage in vault settings.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the stored form.
    ///
    /// # Errors
    /// - Returns `Configuration` for unknown algorithms or missing fields
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Malformed KDF parameters: {}", e)))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::pbkdf2(DEFAULT_PBKDF2_ITERATIONS)
    }
}

/// Generate a random salt of `length` bytes.
///
/// # Errors
/// - Returns `Configuration` if `length` is zero
pub fn generate_salt(length: usize) -> Result<Salt> {
    Salt::generate_with_length(length)
}

/// Derive a key from a password and salt.
///
/// # Preconditions
/// - `params` must describe a valid cost (non-zero iterations)
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns `Configuration` if parameters are invalid or the salt is
///   unusable for the chosen algorithm
///
/// # Security
/// - Empty passwords are accepted here; callers validate input first
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    if salt.is_empty() {
        return Err(Error::Configuration("Salt cannot be empty".to_string()));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];

    match params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            if *iterations == 0 {
                return Err(Error::Configuration(
                    "PBKDF2 iteration count must be greater than zero".to_string(),
                ));
            }
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), *iterations, &mut key_bytes);
        }
        KdfParams::Argon2id {
            memory_cost,
            time_cost,
            parallelism,
        } => {
            let argon2_params = Params::new(*memory_cost, *time_cost, *parallelism, Some(KEY_LENGTH))
                .map_err(|e| Error::Configuration(format!("Invalid KDF parameters: {}", e)))?;

            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
            argon2
                .hash_password_into(password, salt.as_bytes(), &mut key_bytes)
                .map_err(|e| Error::Configuration(format!("Key derivation failed: {}", e)))?;
        }
    }

    let key = DerivedKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}
