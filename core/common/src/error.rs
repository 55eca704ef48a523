//! Common error types for credvault.

use thiserror::Error;

/// Top-level error type for credvault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Persisted vault settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// User input was rejected before any cryptography ran.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The supplied password did not open the vault.
    ///
    /// Carries no detail: a wrong password and a damaged canary look the same.
    #[error("Authentication failed")]
    Authentication,

    /// Ciphertext is malformed or does not decrypt under the given key.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A cryptographic primitive failed while producing output.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation not permitted in the current state (e.g. vault locked).
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
