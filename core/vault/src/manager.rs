//! Vault facade over a store and a session.

use std::sync::Arc;

use tracing::debug;

use crate::rotation::{rotate_password, RotationResult};
use crate::session::{unlocked, VaultSession};
use crate::unlock::{vault_status, UnlockProtocol, UnlockState, VaultStatus};
use credvault_common::{Error, RecordId, Result, SensitiveString};
use credvault_crypto::{envelope, KdfParams};
use credvault_storage::{CredentialRecord, RecordStore, VaultStore};

/// A vault bound to one store.
///
/// Owns the session, so each `Vault` is one independent unlock scope.
pub struct Vault<S: VaultStore + ?Sized> {
    store: Arc<S>,
    session: VaultSession,
    kdf: KdfParams,
}

impl<S: VaultStore + ?Sized> Vault<S> {
    /// Create a locked vault over `store`.
    ///
    /// `kdf` is used when a vault is created and when the password is
    /// rotated. Unlocking always uses the parameters stored with the vault.
    pub fn new(store: Arc<S>, kdf: KdfParams) -> Self {
        Self {
            store,
            session: VaultSession::new(),
            kdf,
        }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the session.
    pub fn session(&self) -> &VaultSession {
        &self.session
    }

    /// KDF parameters used for creation and rotation.
    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    /// Report whether a vault exists in the store.
    pub async fn status(&self) -> Result<VaultStatus> {
        vault_status(self.store.as_ref()).await
    }

    /// Create the vault and unlock it.
    ///
    /// # Errors
    /// - `AlreadyExists` if a vault exists
    /// - `Validation` for a blank or mismatched password
    pub async fn initialize(&self, password: &str, confirmation: &str) -> Result<()> {
        let mut protocol = UnlockProtocol::start(self.store.as_ref()).await?;
        if protocol.prompt() != UnlockState::CreatingPassword {
            return Err(Error::AlreadyExists("A vault already exists".to_string()));
        }
        protocol
            .create(self.store.as_ref(), &self.session, password, confirmation, &self.kdf)
            .await
    }

    /// Unlock the vault with `password`.
    ///
    /// # Errors
    /// - `NotFound` if no vault exists
    /// - `Validation` for blank input
    /// - `Authentication` if the password is wrong
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let mut protocol = UnlockProtocol::start(self.store.as_ref()).await?;
        if protocol.prompt() != UnlockState::EnteringPassword {
            return Err(Error::NotFound("No vault has been created".to_string()));
        }
        protocol.enter(self.store.as_ref(), &self.session, password).await
    }

    /// Lock the vault, zeroizing the key.
    pub async fn lock(&self) {
        self.session.lock().await;
    }

    /// Check if the vault is unlocked.
    pub async fn is_unlocked(&self) -> bool {
        self.session.is_active().await
    }

    /// Encrypt a secret under the session key.
    pub async fn encrypt_secret(&self, plaintext: &str) -> Result<String> {
        self.session.encrypt(plaintext).await
    }

    /// Decrypt a stored secret under the session key.
    pub async fn decrypt_secret(&self, ciphertext: &str) -> Result<SensitiveString> {
        self.session.decrypt(ciphertext).await
    }

    /// Encrypt `plaintext` and store it as the secret field of `id`.
    ///
    /// # Errors
    /// - `NotPermitted` if locked
    /// - `NotFound` if the record does not exist
    pub async fn store_secret(&self, id: &RecordId, plaintext: &str) -> Result<()> {
        let guard = self.session.shared().await;
        let ciphertext = envelope::encrypt(plaintext, unlocked(&guard)?)?;
        self.store.write_secret_field(id, Some(&ciphertext)).await?;
        debug!(record = %id, "Secret stored");
        Ok(())
    }

    /// Read and decrypt the secret field of `id`.
    ///
    /// # Returns
    /// - `Ok(None)` if the record has no secret
    ///
    /// # Errors
    /// - `NotPermitted` if locked
    /// - `NotFound` if the record does not exist
    /// - `Decryption` if the stored ciphertext does not open
    pub async fn reveal_secret(&self, id: &RecordId) -> Result<Option<SensitiveString>> {
        let guard = self.session.shared().await;
        let key = unlocked(&guard)?;
        match self.store.read_secret_field(id).await? {
            Some(ciphertext) if !ciphertext.is_empty() => {
                envelope::decrypt(&ciphertext, key).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Remove the secret field of `id`.
    ///
    /// # Errors
    /// - `NotPermitted` if locked
    /// - `NotFound` if the record does not exist
    pub async fn clear_secret(&self, id: &RecordId) -> Result<()> {
        let guard = self.session.shared().await;
        unlocked(&guard)?;
        self.store.write_secret_field(id, None).await?;
        debug!(record = %id, "Secret cleared");
        Ok(())
    }

    /// Rotate the master password and re-encrypt every secret.
    ///
    /// See [`rotate_password`] for the guarantees.
    pub async fn rotate_password(
        &self,
        old_password: &str,
        new_password: &str,
        confirmation: Option<&str>,
    ) -> Result<RotationResult> {
        rotate_password(
            self.store.as_ref(),
            &self.session,
            old_password,
            new_password,
            confirmation,
            &self.kdf,
        )
        .await
    }
}

/// Record edits, serialized against rotation through the session lock.
///
/// None of these need the key; they only wait for a running rotation.
impl<S: VaultStore + RecordStore + ?Sized> Vault<S> {
    /// Insert a new record.
    ///
    /// # Errors
    /// - `AlreadyExists` if a record with the same id exists
    pub async fn add_record(&self, record: &CredentialRecord) -> Result<()> {
        let _guard = self.session.shared().await;
        if self.store.get_record(&record.id).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "Record already exists: {}",
                record.id
            )));
        }
        self.store.upsert_record(record).await?;
        debug!(record = %record.id, "Record added");
        Ok(())
    }

    /// Update the connection fields of an existing record.
    ///
    /// The stored secret is never touched; use [`Vault::store_secret`].
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    pub async fn update_record(&self, record: &CredentialRecord) -> Result<()> {
        let _guard = self.session.shared().await;
        if self.store.get_record(&record.id).await?.is_none() {
            return Err(Error::NotFound(format!("Record not found: {}", record.id)));
        }
        self.store.upsert_record(record).await?;
        debug!(record = %record.id, "Record updated");
        Ok(())
    }

    /// Delete a record and its secret.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    pub async fn remove_record(&self, id: &RecordId) -> Result<()> {
        let _guard = self.session.shared().await;
        self.store.delete_record(id).await?;
        debug!(record = %id, "Record removed");
        Ok(())
    }
}
