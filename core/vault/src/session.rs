//! Vault session management.
//!
//! The session is the only owner of the derived key. It starts locked, is
//! unlocked by a successful unlock or rotation, and zeroizes the key when
//! locked or dropped.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

use credvault_common::{Error, Result, SensitiveString};
use credvault_crypto::{envelope, DerivedKey};

/// Session handle for tracking active sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// State of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A key is held and secrets can be read and written.
    Unlocked,
    /// No key is held.
    Locked,
}

pub(crate) type KeySlot = Option<DerivedKey>;

/// Holder of the live derived key.
///
/// Reads (encrypt/decrypt) share the lock. Rotation takes it exclusively for
/// its whole run so no secret is read or written under a key that is about
/// to be replaced.
pub struct VaultSession {
    handle: SessionHandle,
    key: RwLock<KeySlot>,
}

impl VaultSession {
    /// Create a locked session.
    pub fn new() -> Self {
        Self {
            handle: SessionHandle::new(),
            key: RwLock::new(None),
        }
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Get the current session state.
    pub async fn state(&self) -> SessionState {
        if self.key.read().await.is_some() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    /// Check if a key is held.
    pub async fn is_active(&self) -> bool {
        self.state().await == SessionState::Unlocked
    }

    /// Install a key, replacing (and zeroizing) any previous one.
    pub async fn set(&self, key: DerivedKey) {
        *self.key.write().await = Some(key);
    }

    /// Lock the session, clearing the key from memory.
    ///
    /// # Postconditions
    /// - Key is zeroized and removed
    /// - Session state is Locked
    pub async fn lock(&self) {
        if self.clear().await {
            info!(session = %self.handle.as_str(), "Vault locked");
        }
    }

    /// Drop the key, if any. Returns whether a key was held.
    pub async fn clear(&self) -> bool {
        self.key.write().await.take().is_some()
    }

    /// Run `f` with the key borrowed.
    ///
    /// # Errors
    /// - `NotPermitted` if the session is locked
    pub async fn with_key<R>(&self, f: impl FnOnce(&DerivedKey) -> Result<R>) -> Result<R> {
        let guard = self.key.read().await;
        f(unlocked(&guard)?)
    }

    /// Encrypt a secret under the current key.
    pub async fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.with_key(|key| envelope::encrypt(plaintext, key)).await
    }

    /// Decrypt a secret under the current key.
    pub async fn decrypt(&self, ciphertext: &str) -> Result<SensitiveString> {
        self.with_key(|key| envelope::decrypt(ciphertext, key)).await
    }

    /// Shared access held across store I/O.
    pub(crate) async fn shared(&self) -> RwLockReadGuard<'_, KeySlot> {
        self.key.read().await
    }

    /// Exclusive access held for a whole rotation.
    pub(crate) async fn exclusive(&self) -> RwLockWriteGuard<'_, KeySlot> {
        self.key.write().await
    }
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrow the key out of a slot, failing if the session is locked.
pub(crate) fn unlocked(slot: &KeySlot) -> Result<&DerivedKey> {
    slot.as_ref()
        .ok_or_else(|| Error::NotPermitted("Vault is locked".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_starts_locked() {
        let session = VaultSession::new();
        assert_eq!(session.state().await, SessionState::Locked);
        assert!(matches!(
            session.encrypt("x").await,
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_set_and_use_key() {
        let session = VaultSession::new();
        session.set(DerivedKey::generate()).await;

        assert!(session.is_active().await);
        let ciphertext = session.encrypt("secret").await.unwrap();
        assert_eq!(session.decrypt(&ciphertext).await.unwrap().expose(), "secret");
    }

    #[tokio::test]
    async fn test_session_lock() {
        let session = VaultSession::new();
        session.set(DerivedKey::generate()).await;
        let ciphertext = session.encrypt("secret").await.unwrap();

        session.lock().await;

        assert!(!session.is_active().await);
        assert!(!session.clear().await);
        assert!(matches!(
            session.decrypt(&ciphertext).await,
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_set_replaces_key() {
        let session = VaultSession::new();
        session.set(DerivedKey::generate()).await;
        let ciphertext = session.encrypt("secret").await.unwrap();

        session.set(DerivedKey::generate()).await;
        assert!(matches!(
            session.decrypt(&ciphertext).await,
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_handles_are_unique() {
        assert_ne!(SessionHandle::new(), SessionHandle::new());
    }
}
