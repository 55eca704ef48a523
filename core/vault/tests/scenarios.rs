//! End-to-end vault scenarios over both reference stores.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use credvault_common::{Error, RecordId, Result};
use credvault_crypto::{derive_key, envelope, KdfParams, Salt};
use credvault_storage::{
    ChangeSet, CredentialRecord, MemoryStore, RecordStore, SecretField, SecretFieldAccessor,
    SettingsStore, SqliteStore, VaultStore,
};
use credvault_vault::{
    Vault, VaultStatus, CANARY_PLAINTEXT, CHECK_SETTING, KDF_SETTING, SALT_SETTING,
};
use tokio::sync::Notify;

fn fast() -> KdfParams {
    KdfParams::pbkdf2(1_000)
}

fn id(s: &str) -> RecordId {
    RecordId::new(s).unwrap()
}

async fn add_record<S: RecordStore + ?Sized>(store: &S, record_id: &str) {
    let record = CredentialRecord::new(id(record_id), record_id, "10.0.0.1", 22, "ssh", "admin");
    store.upsert_record(&record).await.unwrap();
}

async fn settings<S: SettingsStore + ?Sized>(store: &S) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for key in [SALT_SETTING, CHECK_SETTING, KDF_SETTING] {
        values.push(store.get_setting(key).await.unwrap());
    }
    values
}

async fn creation<S: VaultStore + ?Sized>(store: Arc<S>) {
    let vault = Vault::new(store.clone(), KdfParams::default());
    assert_eq!(vault.status().await.unwrap(), VaultStatus::NoVaultOnDisk);

    vault.initialize("Summer#24", "Summer#24").await.unwrap();
    assert!(vault.is_unlocked().await);

    let encoded_salt = store.get_setting(SALT_SETTING).await.unwrap().unwrap();
    assert_eq!(STANDARD.decode(&encoded_salt).unwrap().len(), 32);

    let salt = Salt::from_encoded(&encoded_salt).unwrap();
    let key = derive_key(b"Summer#24", &salt, &KdfParams::default()).unwrap();
    let check = store.get_setting(CHECK_SETTING).await.unwrap().unwrap();
    assert_eq!(envelope::decrypt(&check, &key).unwrap().expose(), CANARY_PLAINTEXT);
}

async fn rejection<S: VaultStore + ?Sized>(store: Arc<S>) {
    let creator = Vault::new(store.clone(), fast());
    creator.initialize("correct", "correct").await.unwrap();
    let before = settings(store.as_ref()).await;

    let vault = Vault::new(store.clone(), fast());
    assert!(matches!(vault.unlock("incorrect").await, Err(Error::Authentication)));
    assert!(!vault.is_unlocked().await);
    assert_eq!(settings(store.as_ref()).await, before);

    vault.unlock("correct").await.unwrap();
    assert!(vault.is_unlocked().await);
}

async fn rotation<S: VaultStore + RecordStore + ?Sized>(store: Arc<S>) {
    let vault = Vault::new(store.clone(), fast());
    vault.initialize("old", "old").await.unwrap();

    let secrets = [("r1", "alpha"), ("r2", "bravo"), ("r3", "charlie")];
    for (record_id, plaintext) in secrets {
        add_record(store.as_ref(), record_id).await;
        vault.store_secret(&id(record_id), plaintext).await.unwrap();
    }

    let result = vault.rotate_password("old", "new", Some("new")).await.unwrap();
    assert_eq!(result.migrated_count, 3);
    assert!(result.failed_ids.is_empty());

    let reopened = Vault::new(store.clone(), fast());
    assert!(matches!(reopened.unlock("old").await, Err(Error::Authentication)));
    reopened.unlock("new").await.unwrap();
    for (record_id, plaintext) in secrets {
        let revealed = reopened.reveal_secret(&id(record_id)).await.unwrap().unwrap();
        assert_eq!(revealed.expose(), plaintext);
    }
}

async fn partial_failure<S: VaultStore + RecordStore + ?Sized>(store: Arc<S>) {
    let vault = Vault::new(store.clone(), fast());
    vault.initialize("old", "old").await.unwrap();

    for (record_id, plaintext) in [("ok-1", "one"), ("bad", "two"), ("ok-2", "three")] {
        add_record(store.as_ref(), record_id).await;
        vault.store_secret(&id(record_id), plaintext).await.unwrap();
    }

    let mut bytes = STANDARD
        .decode(store.read_secret_field(&id("bad")).await.unwrap().unwrap())
        .unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let corrupted = STANDARD.encode(&bytes);
    store.write_secret_field(&id("bad"), Some(&corrupted)).await.unwrap();

    let result = vault.rotate_password("old", "new", None).await.unwrap();
    assert_eq!(result.migrated_count, 2);
    assert_eq!(result.failed_ids, BTreeSet::from([id("bad")]));
    assert_eq!(
        store.read_secret_field(&id("bad")).await.unwrap().as_deref(),
        Some(corrupted.as_str())
    );
    assert_eq!(vault.reveal_secret(&id("ok-2")).await.unwrap().unwrap().expose(), "three");
}

async fn tamper<S: VaultStore + RecordStore + ?Sized>(store: Arc<S>) {
    let vault = Vault::new(store.clone(), fast());
    vault.initialize("pw", "pw").await.unwrap();
    add_record(store.as_ref(), "target").await;
    vault.store_secret(&id("target"), "top secret").await.unwrap();

    let stored = store.read_secret_field(&id("target")).await.unwrap().unwrap();
    let bytes = STANDARD.decode(&stored).unwrap();
    for index in 0..bytes.len() {
        let mut flipped = bytes.clone();
        flipped[index] ^= 0x80;
        let result = vault.decrypt_secret(&STANDARD.encode(&flipped)).await;
        assert!(matches!(result, Err(Error::Decryption(_))), "byte {index}");
    }
}

async fn failed_commit<S: VaultStore + RecordStore + ?Sized>(store: Arc<S>, fail: impl FnOnce()) {
    let vault = Vault::new(store.clone(), fast());
    vault.initialize("old", "old").await.unwrap();
    add_record(store.as_ref(), "r1").await;
    vault.store_secret(&id("r1"), "alpha").await.unwrap();

    let before = settings(store.as_ref()).await;
    let field = store.read_secret_field(&id("r1")).await.unwrap();

    fail();
    assert!(vault.rotate_password("old", "new", None).await.is_err());

    assert_eq!(settings(store.as_ref()).await, before);
    assert_eq!(store.read_secret_field(&id("r1")).await.unwrap(), field);
    assert_eq!(vault.reveal_secret(&id("r1")).await.unwrap().unwrap().expose(), "alpha");
}

async fn stale_edit<S: VaultStore + RecordStore + ?Sized>(store: Arc<S>) {
    let vault = Vault::new(store.clone(), fast());
    vault.initialize("old", "old").await.unwrap();
    add_record(store.as_ref(), "r1").await;
    vault.store_secret(&id("r1"), "hunter2").await.unwrap();

    let mut edited = store.get_record(&id("r1")).await.unwrap().unwrap();
    let result = vault.rotate_password("old", "new", None).await.unwrap();
    assert_eq!(result.migrated_count, 1);

    edited.username = "operator".to_string();
    store.upsert_record(&edited).await.unwrap();

    assert_eq!(vault.reveal_secret(&id("r1")).await.unwrap().unwrap().expose(), "hunter2");
    let stored = store.get_record(&id("r1")).await.unwrap().unwrap();
    assert_eq!(stored.username, "operator");
}

/// Memory store that parks a rotation inside `secret_fields` until released.
#[derive(Default)]
struct GatedStore {
    inner: MemoryStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SettingsStore for GatedStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_setting(key).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_setting(key, value).await
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        self.inner.remove_setting(key).await
    }
}

#[async_trait]
impl SecretFieldAccessor for GatedStore {
    async fn secret_fields(&self) -> Result<Vec<SecretField>> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.secret_fields().await
    }

    async fn read_secret_field(&self, id: &RecordId) -> Result<Option<String>> {
        self.inner.read_secret_field(id).await
    }

    async fn write_secret_field(&self, id: &RecordId, ciphertext: Option<&str>) -> Result<()> {
        self.inner.write_secret_field(id, ciphertext).await
    }
}

#[async_trait]
impl VaultStore for GatedStore {
    fn name(&self) -> &str {
        "gated"
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        self.inner.apply(changes).await
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn upsert_record(&self, record: &CredentialRecord) -> Result<()> {
        self.inner.upsert_record(record).await
    }

    async fn get_record(&self, id: &RecordId) -> Result<Option<CredentialRecord>> {
        self.inner.get_record(id).await
    }

    async fn list_records(&self) -> Result<Vec<CredentialRecord>> {
        self.inner.list_records().await
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.inner.delete_record(id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_secret_writes_wait_for_rotation() {
    let store = Arc::new(GatedStore::default());
    let vault = Arc::new(Vault::new(store.clone(), fast()));
    vault.initialize("old", "old").await.unwrap();
    add_record(store.as_ref(), "r1").await;
    add_record(store.as_ref(), "r2").await;
    vault.store_secret(&id("r1"), "alpha").await.unwrap();

    let rotation = tokio::spawn({
        let vault = vault.clone();
        async move { vault.rotate_password("old", "new", None).await }
    });
    store.entered.notified().await;

    let writer = tokio::spawn({
        let vault = vault.clone();
        async move { vault.store_secret(&id("r2"), "bravo").await }
    });
    let editor = tokio::spawn({
        let vault = vault.clone();
        async move { vault.remove_record(&id("r1")).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!writer.is_finished());
    assert!(!editor.is_finished());

    store.release.notify_one();
    let result = rotation.await.unwrap().unwrap();
    assert_eq!(result.migrated_count, 1);
    writer.await.unwrap().unwrap();
    editor.await.unwrap().unwrap();

    vault.lock().await;
    vault.unlock("new").await.unwrap();
    assert_eq!(vault.reveal_secret(&id("r2")).await.unwrap().unwrap().expose(), "bravo");
    assert!(store.get_record(&id("r1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_edit_memory() {
    stale_edit(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_stale_edit_sqlite() {
    stale_edit(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_creation_memory() {
    creation(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_creation_sqlite() {
    creation(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_rejection_memory() {
    rejection(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_rejection_sqlite() {
    rejection(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_rotation_memory() {
    rotation(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_rotation_sqlite() {
    rotation(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_partial_failure_memory() {
    partial_failure(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_partial_failure_sqlite() {
    partial_failure(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_tamper_memory() {
    tamper(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_tamper_sqlite() {
    tamper(Arc::new(SqliteStore::in_memory().unwrap())).await;
}

#[tokio::test]
async fn test_failed_commit_memory() {
    let store = Arc::new(MemoryStore::new());
    let handle = store.clone();
    failed_commit(store, move || handle.fail_next_apply()).await;
}

#[tokio::test]
async fn test_sqlite_vault_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let vault = Vault::new(store.clone(), fast());
        vault.initialize("pw", "pw").await.unwrap();
        add_record(store.as_ref(), "r1").await;
        vault.store_secret(&id("r1"), "persisted").await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let vault = Vault::new(store, fast());
    assert_eq!(vault.status().await.unwrap(), VaultStatus::VaultExists);
    vault.unlock("pw").await.unwrap();
    assert_eq!(
        vault.reveal_secret(&id("r1")).await.unwrap().unwrap().expose(),
        "persisted"
    );
}
