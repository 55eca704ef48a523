//! Persisted vault settings: salt, canary and KDF parameters.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::password::MasterPassword;
use credvault_common::{Error, Result};
use credvault_crypto::{derive_key, envelope, DerivedKey, KdfParams, Salt, DEFAULT_SALT_LENGTH};
use credvault_storage::{ChangeSet, SettingsStore};

/// Setting holding the base64 salt.
pub const SALT_SETTING: &str = "EncryptionSalt";

/// Setting holding the canary ciphertext.
pub const CHECK_SETTING: &str = "EncryptionCheck";

/// Setting holding the KDF algorithm and cost as JSON.
pub const KDF_SETTING: &str = "EncryptionKdf";

/// Known plaintext encrypted into the canary.
pub const CANARY_PLAINTEXT: &str = "VAULT-OK";

/// Everything needed to turn a password into the vault key and check it.
///
/// One header exists per vault generation. Rotation replaces all three
/// settings together.
#[derive(Debug, Clone)]
pub struct VaultHeader {
    /// Salt for key derivation.
    pub salt: Salt,
    /// Canary ciphertext under the current key.
    pub check: String,
    /// KDF algorithm and cost.
    pub kdf: KdfParams,
}

impl VaultHeader {
    /// Create a fresh header for `password`.
    ///
    /// # Postconditions
    /// - Salt is newly generated
    /// - Returned key opens the returned canary
    pub fn create(password: &MasterPassword, kdf: KdfParams) -> Result<(Self, DerivedKey)> {
        let salt = Salt::generate_with_length(DEFAULT_SALT_LENGTH)?;
        let key = derive_key(password.as_bytes(), &salt, &kdf)?;
        let check = envelope::encrypt(CANARY_PLAINTEXT, &key)?;

        debug!(kdf = kdf.algorithm(), "Vault header created");
        Ok((Self { salt, check, kdf }, key))
    }

    /// Load the header from settings.
    ///
    /// # Returns
    /// - `Ok(None)` if no salt is stored (no vault yet)
    ///
    /// # Errors
    /// - `Configuration` if the salt is malformed, the canary is missing, or
    ///   the KDF setting cannot be parsed
    pub async fn load<S: SettingsStore + ?Sized>(store: &S) -> Result<Option<Self>> {
        let Some(encoded_salt) = store.get_setting(SALT_SETTING).await? else {
            return Ok(None);
        };
        let salt = Salt::from_encoded(&encoded_salt)?;

        let check = store
            .get_setting(CHECK_SETTING)
            .await?
            .filter(|check| !check.trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration("Vault salt exists but the canary is missing".to_string())
            })?;

        // Vaults created before the KDF was recorded used PBKDF2 defaults.
        let kdf = match store.get_setting(KDF_SETTING).await? {
            Some(json) => KdfParams::from_json(&json)?,
            None => KdfParams::default(),
        };

        Ok(Some(Self { salt, check, kdf }))
    }

    /// Derive the key for `password` and check it against the canary.
    ///
    /// # Errors
    /// - `Authentication` if the canary does not decrypt to the expected
    ///   plaintext, whatever the reason
    /// - `Configuration` if the stored KDF parameters are unusable
    pub fn verify(&self, password: &MasterPassword) -> Result<DerivedKey> {
        let candidate = derive_key(password.as_bytes(), &self.salt, &self.kdf)?;

        match envelope::decrypt(&self.check, &candidate) {
            Ok(plaintext)
                if bool::from(plaintext.expose().as_bytes().ct_eq(CANARY_PLAINTEXT.as_bytes())) =>
            {
                Ok(candidate)
            }
            _ => Err(Error::Authentication),
        }
    }

    /// Stage all three settings into `changes`.
    pub fn stage(&self, changes: &mut ChangeSet) -> Result<()> {
        changes
            .set_setting(SALT_SETTING, self.salt.to_encoded())
            .set_setting(CHECK_SETTING, self.check.clone())
            .set_setting(KDF_SETTING, self.kdf.to_json()?);
        Ok(())
    }
}
