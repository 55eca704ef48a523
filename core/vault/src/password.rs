//! Master password input.

use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use credvault_common::{Error, Result};

/// A validated master password, zeroized on drop.
///
/// Construction rejects empty and whitespace-only input, so holding one means
/// the password is safe to feed to key derivation.
pub struct MasterPassword(Zeroizing<String>);

impl MasterPassword {
    /// Validate a single password entry.
    ///
    /// # Errors
    /// - `Validation` if the password is empty or only whitespace
    pub fn new(password: impl Into<String>) -> Result<Self> {
        let password = Zeroizing::new(password.into());
        if password.trim().is_empty() {
            return Err(Error::Validation("Password cannot be empty".to_string()));
        }
        Ok(Self(password))
    }

    /// Validate a password that was entered twice.
    ///
    /// # Errors
    /// - `Validation` if the password is blank or the entries differ
    pub fn with_confirmation(password: impl Into<String>, confirmation: &str) -> Result<Self> {
        let password = Self::new(password)?;
        if !bool::from(password.as_bytes().ct_eq(confirmation.as_bytes())) {
            return Err(Error::Validation("Passwords do not match".to_string()));
        }
        Ok(password)
    }

    /// Password bytes for key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for MasterPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterPassword([REDACTED])")
    }
}
