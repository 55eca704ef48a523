//! Master password rotation.
//!
//! Every secret field is re-encrypted under a key derived from the new
//! password and a fresh salt. The new header and all rewritten fields are
//! committed as one [`ChangeSet`]; the session key is swapped only after the
//! commit succeeds.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::VaultHeader;
use crate::password::MasterPassword;
use crate::session::{unlocked, VaultSession};
use credvault_common::{Error, RecordId, Result};
use credvault_crypto::{envelope, KdfParams};
use credvault_storage::{ChangeSet, VaultStore};

/// Outcome of a completed rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationResult {
    /// Secret fields re-encrypted under the new key.
    pub migrated_count: usize,
    /// Records whose secret could not be decrypted under the old key.
    ///
    /// Their stored ciphertext is left exactly as it was.
    pub failed_ids: BTreeSet<RecordId>,
}

impl RotationResult {
    /// Check if every secret was migrated.
    pub fn is_clean(&self) -> bool {
        self.failed_ids.is_empty()
    }
}

/// Replace the master password and re-encrypt every secret.
///
/// # Preconditions
/// - Session is unlocked
///
/// # Postconditions
/// - On `Ok`, salt, canary and KDF settings belong to `new_password` and
///   every migrated field decrypts under the new session key
/// - On `Err`, nothing persisted has changed and the session keeps its key
///
/// # Errors
/// - `NotPermitted` if the session is locked
/// - `Validation` for blank passwords or a mismatched confirmation
/// - `Authentication` if `old_password` is wrong
/// - `NotFound` if no vault exists
/// - Any commit error from the store
///
/// # Security
/// - Holds the session write lock for the whole run
/// - The old key is re-derived from `old_password`, never trusted from the
///   session alone
pub async fn rotate_password<S: VaultStore + ?Sized>(
    store: &S,
    session: &VaultSession,
    old_password: &str,
    new_password: &str,
    confirmation: Option<&str>,
    kdf: &KdfParams,
) -> Result<RotationResult> {
    let mut guard = session.exclusive().await;
    unlocked(&guard)?;

    let old_password = MasterPassword::new(old_password)?;
    let current = VaultHeader::load(store)
        .await?
        .ok_or_else(|| Error::NotFound("No vault has been created".to_string()))?;
    let old_key = current.verify(&old_password).inspect_err(|e| {
        if matches!(e, Error::Authentication) {
            warn!("Password rotation rejected: old password mismatch");
        }
    })?;

    let new_password = match confirmation {
        Some(confirmation) => MasterPassword::with_confirmation(new_password, confirmation)?,
        None => MasterPassword::new(new_password)?,
    };

    let (header, new_key) = VaultHeader::create(&new_password, kdf.clone())?;
    let mut changes = ChangeSet::new();
    header.stage(&mut changes)?;

    let mut result = RotationResult::default();
    for field in store.secret_fields().await? {
        let plaintext = match envelope::decrypt(&field.ciphertext, &old_key) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(record = %field.id, error = %e, "Secret could not be migrated");
                result.failed_ids.insert(field.id);
                continue;
            }
        };

        let ciphertext = envelope::encrypt(plaintext.expose(), &new_key)?;
        debug!(record = %field.id, "Secret re-encrypted");
        changes.rewrite_secret(field.id, ciphertext);
        result.migrated_count += 1;
    }

    store.apply(changes).await?;
    *guard = Some(new_key);

    info!(
        migrated = result.migrated_count,
        failed = result.failed_ids.len(),
        kdf = kdf.algorithm(),
        "Master password rotated"
    );
    Ok(result)
}
