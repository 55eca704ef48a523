//! Storage collaborators for credvault.
//!
//! The vault never sees a record schema. It talks to storage through:
//! - [`SettingsStore`]: named settings (salt, canary, KDF parameters)
//! - [`SecretFieldAccessor`]: enumerate and rewrite secret fields by record id
//! - [`VaultStore`]: both of the above plus an atomic [`ChangeSet`] commit
//!
//! [`RecordStore`] is the connection-manager side: CRUD over the records
//! that carry those secret fields.
//!
//! # Design Principles
//! - Store isolation: no crypto in this crate, only opaque strings
//! - Async operations: all I/O is async
//! - Atomic commits: a change set lands completely or not at all

pub mod changes;
pub mod memory;
pub mod provider;
pub mod records;
pub mod sqlite;

pub use changes::{ChangeSet, SettingChange};
pub use memory::MemoryStore;
pub use provider::{SecretField, SecretFieldAccessor, SettingsStore, VaultStore};
pub use records::{CredentialRecord, RecordStore};
pub use sqlite::SqliteStore;
