//! Collaborator traits the vault core is written against.

use async_trait::async_trait;

use crate::changes::ChangeSet;
use credvault_common::{RecordId, Result};

/// A secret field as stored: the owning record and its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretField {
    /// Record that owns the field.
    pub id: RecordId,
    /// Stored ciphertext text.
    pub ciphertext: String,
}

/// Key/value settings persistence.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a setting.
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a setting.
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a setting. Removing a missing key is not an error.
    async fn remove_setting(&self, key: &str) -> Result<()>;
}

/// Access to every secret-bearing field, by record id.
#[async_trait]
pub trait SecretFieldAccessor: Send + Sync {
    /// All records whose secret field is present and non-empty.
    async fn secret_fields(&self) -> Result<Vec<SecretField>>;

    /// Read one record's secret field.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    async fn read_secret_field(&self, id: &RecordId) -> Result<Option<String>>;

    /// Replace or clear one record's secret field.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    async fn write_secret_field(&self, id: &RecordId, ciphertext: Option<&str>) -> Result<()>;
}

/// Store the vault persists through.
///
/// Implementations must make [`apply`](VaultStore::apply) all-or-nothing.
#[async_trait]
pub trait VaultStore: SettingsStore + SecretFieldAccessor {
    /// Store name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Commit every staged change atomically.
    ///
    /// # Postconditions
    /// - On success every setting change and secret rewrite is persisted
    /// - On failure nothing is persisted
    ///
    /// # Errors
    /// - `NotFound` if a rewrite names an unknown record
    /// - `Storage` if the backend fails
    async fn apply(&self, changes: ChangeSet) -> Result<()>;
}
