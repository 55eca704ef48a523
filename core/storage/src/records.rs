//! Connection records that carry an encrypted secret field.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use credvault_common::{RecordId, Result};

/// A saved remote connection.
///
/// `secret` holds ciphertext produced by the vault, never a plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Opaque record identifier.
    pub id: RecordId,
    /// Display name.
    pub label: String,
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Protocol name (e.g., "SSH", "RDP", "VNC").
    pub protocol: String,
    /// Login name.
    pub username: String,
    /// Encrypted password, if one is saved. Read-only through
    /// [`RecordStore`].
    pub secret: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Create a record without a secret.
    pub fn new(
        id: RecordId,
        label: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        protocol: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            host: host.into(),
            port,
            protocol: protocol.into(),
            username: username.into(),
            secret: None,
            notes: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether a non-empty secret field is present.
    pub fn has_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// CRUD over connection records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record's connection fields.
    ///
    /// The `secret` field of `record` is ignored: a new record starts
    /// without a secret and an existing one keeps its stored ciphertext.
    /// Secrets are written only through
    /// [`SecretFieldAccessor`](crate::SecretFieldAccessor).
    async fn upsert_record(&self, record: &CredentialRecord) -> Result<()>;

    /// Get a record by id.
    async fn get_record(&self, id: &RecordId) -> Result<Option<CredentialRecord>>;

    /// All records ordered by label.
    async fn list_records(&self) -> Result<Vec<CredentialRecord>>;

    /// Delete a record.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist
    async fn delete_record(&self, id: &RecordId) -> Result<()>;
}
