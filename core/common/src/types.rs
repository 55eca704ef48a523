//! Common types used throughout credvault.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Opaque identifier of a record that carries a secret field.
///
/// The vault never interprets it; stores decide what it means.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new RecordId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::Validation(
                "Record id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decrypted text that zeroizes on drop.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveString(String);

impl SensitiveString {
    /// Wrap a plaintext.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Borrow the plaintext.
    pub fn expose(&self) -> &str {
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

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED; {} bytes])", self.0.len())
    }
}
