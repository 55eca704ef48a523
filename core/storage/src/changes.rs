//! Staged changes committed atomically by a [`VaultStore`](crate::VaultStore).

use credvault_common::RecordId;

/// A pending change to a named setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    /// Insert or replace a setting.
    Set { key: String, value: String },
    /// Delete a setting if present.
    Remove { key: String },
}

/// Settings changes and secret-field rewrites that must land together.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    settings: Vec<SettingChange>,
    secrets: Vec<(RecordId, String)>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a setting write.
    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.settings.push(SettingChange::Set {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Stage a setting removal.
    pub fn remove_setting(&mut self, key: impl Into<String>) -> &mut Self {
        self.settings.push(SettingChange::Remove { key: key.into() });
        self
    }

    /// Stage a replacement ciphertext for a record's secret field.
    pub fn rewrite_secret(&mut self, id: RecordId, ciphertext: impl Into<String>) -> &mut Self {
        self.secrets.push((id, ciphertext.into()));
        self
    }

    /// Staged setting changes, in order.
    pub fn settings(&self) -> &[SettingChange] {
        &self.settings
    }

    /// Staged secret rewrites, in order.
    pub fn secrets(&self) -> &[(RecordId, String)] {
        &self.secrets
    }

    /// Check if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.secrets.is_empty()
    }
}
