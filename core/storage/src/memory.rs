//! In-memory store for testing and ephemeral use.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::changes::{ChangeSet, SettingChange};
use crate::provider::{SecretField, SecretFieldAccessor, SettingsStore, VaultStore};
use crate::records::{CredentialRecord, RecordStore};
use credvault_common::{Error, RecordId, Result};

#[derive(Debug, Default, Clone)]
struct Inner {
    settings: BTreeMap<String, String>,
    records: BTreeMap<RecordId, CredentialRecord>,
}

/// In-memory store.
///
/// All data is lost on drop. A change set is validated and applied under a
/// single write lock, which makes [`VaultStore::apply`] atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_next_apply: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`VaultStore::apply`] fail without writing anything.
    ///
    /// Lets tests observe what a caller does when a commit is refused.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    /// Copy of every setting, for inspection.
    pub fn settings_snapshot(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read()?.settings.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.write()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        self.write()?.settings.remove(key);
        Ok(())
    }
}

#[async_trait]
impl SecretFieldAccessor for MemoryStore {
    async fn secret_fields(&self) -> Result<Vec<SecretField>> {
        let inner = self.read()?;
        Ok(inner
            .records
            .values()
            .filter(|record| record.has_secret())
            .filter_map(|record| {
                record.secret.as_ref().map(|ciphertext| SecretField {
                    id: record.id.clone(),
                    ciphertext: ciphertext.clone(),
                })
            })
            .collect())
    }

    async fn read_secret_field(&self, id: &RecordId) -> Result<Option<String>> {
        let inner = self.read()?;
        let record = inner
            .records
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Record not found: {}", id)))?;
        Ok(record.secret.clone())
    }

    async fn write_secret_field(&self, id: &RecordId, ciphertext: Option<&str>) -> Result<()> {
        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Record not found: {}", id)))?;
        record.secret = ciphertext.map(str::to_string);
        record.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut inner = self.write()?;

        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(Error::Storage("Injected commit failure".to_string()));
        }

        // Validate everything before touching anything.
        for (id, _) in changes.secrets() {
            if !inner.records.contains_key(id) {
                return Err(Error::NotFound(format!("Record not found: {}", id)));
            }
        }

        for change in changes.settings() {
            match change {
                SettingChange::Set { key, value } => {
                    inner.settings.insert(key.clone(), value.clone());
                }
                SettingChange::Remove { key } => {
                    inner.settings.remove(key);
                }
            }
        }

        let now = chrono::Utc::now();
        for (id, ciphertext) in changes.secrets() {
            if let Some(record) = inner.records.get_mut(id) {
                record.secret = Some(ciphertext.clone());
                record.updated_at = now;
            }
        }

        debug!(
            settings = changes.settings().len(),
            secrets = changes.secrets().len(),
            "Change set applied"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_record(&self, record: &CredentialRecord) -> Result<()> {
        let mut inner = self.write()?;
        let secret = inner
            .records
            .get(&record.id)
            .and_then(|existing| existing.secret.clone());

        let mut stored = record.clone();
        stored.secret = secret;
        inner.records.insert(record.id.clone(), stored);
        Ok(())
    }

    async fn get_record(&self, id: &RecordId) -> Result<Option<CredentialRecord>> {
        Ok(self.read()?.records.get(id).cloned())
    }

    async fn list_records(&self) -> Result<Vec<CredentialRecord>> {
        let mut records: Vec<_> = self.read()?.records.values().cloned().collect();
        records.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(records)
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        match self.write()?.records.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Record not found: {}", id))),
        }
    }
}
