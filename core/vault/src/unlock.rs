//! Vault bootstrap and unlock.
//!
//! On first run there is no salt in the settings store and the caller is
//! asked for a new password. Afterwards the password is checked against the
//! stored canary. [`UnlockProtocol`] walks those states explicitly:
//!
//! ```text
//! NoVaultOnDisk -> CreatingPassword -> Unlocked
//! VaultExists   -> EnteringPassword -> Unlocked | Rejected
//! ```

use tracing::{info, warn};

use crate::config::{VaultHeader, SALT_SETTING};
use crate::password::MasterPassword;
use crate::session::VaultSession;
use credvault_common::{Error, Result};
use credvault_crypto::{DerivedKey, KdfParams};
use credvault_storage::{ChangeSet, SettingsStore, VaultStore};

/// Whether a vault has been created in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    /// No salt stored yet.
    NoVaultOnDisk,
    /// Salt (and canary) stored.
    VaultExists,
}

/// Position in the unlock state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    /// The store holds no salt; a password must be created.
    NoVaultOnDisk,
    /// Waiting for a new password and its confirmation.
    CreatingPassword,
    /// A vault exists; the password must be entered.
    VaultExists,
    /// Waiting for the password to check against the canary.
    EnteringPassword,
    /// The session holds the derived key.
    Unlocked,
    /// The password did not verify. Terminal.
    Rejected,
}

/// Report whether the store holds a vault.
pub async fn vault_status<S: SettingsStore + ?Sized>(store: &S) -> Result<VaultStatus> {
    match VaultHeader::load(store).await? {
        Some(_) => Ok(VaultStatus::VaultExists),
        None => Ok(VaultStatus::NoVaultOnDisk),
    }
}

/// Create a vault protected by `password`.
///
/// # Preconditions
/// - No vault exists in `store`
///
/// # Postconditions
/// - Salt, canary and KDF settings are persisted in one commit
/// - Returns the derived key
///
/// # Errors
/// - `AlreadyExists` if a salt is already stored
/// - `Storage` if the commit fails (nothing is persisted)
pub async fn initialize_vault<S: VaultStore + ?Sized>(
    store: &S,
    password: &MasterPassword,
    kdf: &KdfParams,
) -> Result<DerivedKey> {
    if store.get_setting(SALT_SETTING).await?.is_some() {
        return Err(Error::AlreadyExists("A vault already exists".to_string()));
    }

    let (header, key) = VaultHeader::create(password, kdf.clone())?;

    let mut changes = ChangeSet::new();
    header.stage(&mut changes)?;
    store.apply(changes).await?;

    info!(store = store.name(), kdf = kdf.algorithm(), "Vault created");
    Ok(key)
}

/// Check `password` against the stored canary and return the key.
///
/// # Errors
/// - `NotFound` if no vault exists
/// - `Authentication` if the password is wrong or the canary is damaged
/// - `Configuration` if the stored settings are malformed
pub async fn unlock_vault<S: SettingsStore + ?Sized>(
    store: &S,
    password: &MasterPassword,
) -> Result<DerivedKey> {
    let header = VaultHeader::load(store)
        .await?
        .ok_or_else(|| Error::NotFound("No vault has been created".to_string()))?;
    header.verify(password)
}

/// Explicit unlock state machine for one unlock attempt.
///
/// Blank input is rejected before any cryptography and leaves the protocol
/// waiting for another entry. A wrong password moves it to
/// [`UnlockState::Rejected`], which is terminal; whether to start a new
/// attempt is the caller's decision.
#[derive(Debug)]
pub struct UnlockProtocol {
    state: UnlockState,
}

impl UnlockProtocol {
    /// Inspect the store and start in `NoVaultOnDisk` or `VaultExists`.
    pub async fn start<S: SettingsStore + ?Sized>(store: &S) -> Result<Self> {
        let state = match vault_status(store).await? {
            VaultStatus::NoVaultOnDisk => UnlockState::NoVaultOnDisk,
            VaultStatus::VaultExists => UnlockState::VaultExists,
        };
        Ok(Self { state })
    }

    /// Current state.
    pub fn state(&self) -> UnlockState {
        self.state
    }

    /// Move to the password prompt matching the vault status.
    ///
    /// Returns the new state; other states are left unchanged.
    pub fn prompt(&mut self) -> UnlockState {
        self.state = match self.state {
            UnlockState::NoVaultOnDisk => UnlockState::CreatingPassword,
            UnlockState::VaultExists => UnlockState::EnteringPassword,
            other => other,
        };
        self.state
    }

    /// Submit a new password (entered twice) to create the vault.
    ///
    /// # Errors
    /// - `NotPermitted` unless in `CreatingPassword`
    /// - `Validation` for blank or mismatched entries (state unchanged)
    /// - Any commit error from the store (state unchanged)
    pub async fn create<S: VaultStore + ?Sized>(
        &mut self,
        store: &S,
        session: &VaultSession,
        password: &str,
        confirmation: &str,
        kdf: &KdfParams,
    ) -> Result<()> {
        self.require_state(UnlockState::CreatingPassword)?;
        let password = MasterPassword::with_confirmation(password, confirmation)?;

        let key = initialize_vault(store, &password, kdf).await?;
        session.set(key).await;
        self.state = UnlockState::Unlocked;
        Ok(())
    }

    /// Submit the existing password.
    ///
    /// # Errors
    /// - `NotPermitted` unless in `EnteringPassword`
    /// - `Validation` for blank input (state unchanged)
    /// - `Authentication` on mismatch (state becomes `Rejected`)
    pub async fn enter<S: SettingsStore + ?Sized>(
        &mut self,
        store: &S,
        session: &VaultSession,
        password: &str,
    ) -> Result<()> {
        self.require_state(UnlockState::EnteringPassword)?;
        let password = MasterPassword::new(password)?;

        match unlock_vault(store, &password).await {
            Ok(key) => {
                session.set(key).await;
                self.state = UnlockState::Unlocked;
                info!(session = %session.handle().as_str(), "Vault unlocked");
                Ok(())
            }
            Err(Error::Authentication) => {
                self.state = UnlockState::Rejected;
                warn!("Vault unlock rejected");
                Err(Error::Authentication)
            }
            Err(e) => Err(e),
        }
    }

    fn require_state(&self, wanted: UnlockState) -> Result<()> {
        if self.state != wanted {
            return Err(Error::NotPermitted(format!(
                "Unlock protocol is in state {:?}, expected {:?}",
                self.state, wanted
            )));
        }
        Ok(())
    }
}
