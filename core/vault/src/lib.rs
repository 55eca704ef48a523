//! Secrets vault for credvault.
//!
//! This module provides:
//! - Vault creation and unlock against a stored canary
//! - Encryption and decryption of individual secret fields
//! - Master password rotation that re-encrypts every stored secret
//! - Session handling with an explicit lock/unlock lifecycle
//!
//! # Architecture
//! The vault sits between the caller and a [`VaultStore`], which persists
//! the salt, canary and KDF settings plus the ciphertext of every secret
//! field. The derived key exists only inside a [`VaultSession`].
//!
//! # Known gaps
//! There is no lockout or backoff after failed unlock attempts. Retry policy
//! belongs to the caller.
//!
//! [`VaultStore`]: credvault_storage::VaultStore

pub mod config;
pub mod manager;
pub mod password;
pub mod rotation;
pub mod session;
pub mod unlock;

pub use config::{VaultHeader, CANARY_PLAINTEXT, CHECK_SETTING, KDF_SETTING, SALT_SETTING};
pub use manager::Vault;
pub use password::MasterPassword;
pub use rotation::{rotate_password, RotationResult};
pub use session::{SessionHandle, SessionState, VaultSession};
pub use unlock::{initialize_vault, unlock_vault, vault_status, UnlockProtocol, UnlockState, VaultStatus};
