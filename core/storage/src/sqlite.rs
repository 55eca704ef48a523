//! SQLite-backed store.
//!
//! Settings live in a `settings` key/value table and connection records in a
//! `credentials` table whose `secret` column holds vault ciphertext. A change
//! set is committed inside one SQLite transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::changes::{ChangeSet, SettingChange};
use crate::provider::{SecretField, SecretFieldAccessor, SettingsStore, VaultStore};
use crate::records::{CredentialRecord, RecordStore};
use credvault_common::{Error, RecordId, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS credentials (
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        protocol TEXT NOT NULL,
        username TEXT NOT NULL,
        secret TEXT,
        notes TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_credentials_label ON credentials(label);
"#;

/// Store persisted in a SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database, creating missing parent directories.
    ///
    /// # Errors
    /// - `Io` if the parent directory cannot be created
    /// - `Storage` on database creation or schema setup failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path.as_ref()).map_err(map_sql_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sql_err)?;

        info!(path = %db_path.as_ref().display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sql_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))
    }
}

fn map_sql_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Row as read from `credentials`, before validation.
struct RawRecord {
    id: String,
    label: String,
    host: String,
    port: i64,
    protocol: String,
    username: String,
    secret: Option<String>,
    notes: Option<String>,
    updated_at: String,
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        label: row.get(1)?,
        host: row.get(2)?,
        port: row.get(3)?,
        protocol: row.get(4)?,
        username: row.get(5)?,
        secret: row.get(6)?,
        notes: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl TryFrom<RawRecord> for CredentialRecord {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let id = RecordId::new(raw.id)
            .map_err(|_| Error::Storage("Stored record has an empty id".to_string()))?;
        let port = u16::try_from(raw.port)
            .map_err(|_| Error::Storage(format!("Stored port out of range: {}", raw.port)))?;
        let updated_at = DateTime::parse_from_rfc3339(&raw.updated_at)
            .map_err(|e| Error::Storage(format!("Malformed updated_at timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(CredentialRecord {
            id,
            label: raw.label,
            host: raw.host,
            port,
            protocol: raw.protocol,
            username: raw.username,
            secret: raw.secret,
            notes: raw.notes,
            updated_at,
        })
    }
}

const RECORD_COLUMNS: &str =
    "id, label, host, port, protocol, username, secret, notes, updated_at";

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_err)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(map_sql_err)?;
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(map_sql_err)?;
        Ok(())
    }
}

#[async_trait]
impl SecretFieldAccessor for SqliteStore {
    async fn secret_fields(&self) -> Result<Vec<SecretField>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, secret FROM credentials \
                 WHERE secret IS NOT NULL AND secret != '' ORDER BY id",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(map_sql_err)?;

        let mut fields = Vec::new();
        for row in rows {
            let (id, ciphertext) = row.map_err(map_sql_err)?;
            let id = RecordId::new(id)
                .map_err(|_| Error::Storage("Stored record has an empty id".to_string()))?;
            fields.push(SecretField { id, ciphertext });
        }
        Ok(fields)
    }

    async fn read_secret_field(&self, id: &RecordId) -> Result<Option<String>> {
        let secret: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT secret FROM credentials WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_err)?;
        secret.ok_or_else(|| Error::NotFound(format!("Record not found: {}", id)))
    }

    async fn write_secret_field(&self, id: &RecordId, ciphertext: Option<&str>) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE credentials SET secret = ?1, updated_at = ?2 WHERE id = ?3",
                params![ciphertext, Utc::now().to_rfc3339(), id.as_str()],
            )
            .map_err(map_sql_err)?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Record not found: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(map_sql_err)?;

        for change in changes.settings() {
            match change {
                SettingChange::Set { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )
                    .map_err(map_sql_err)?;
                }
                SettingChange::Remove { key } => {
                    tx.execute("DELETE FROM settings WHERE key = ?1", params![key])
                        .map_err(map_sql_err)?;
                }
            }
        }

        let now = Utc::now().to_rfc3339();
        for (id, ciphertext) in changes.secrets() {
            let updated = tx
                .execute(
                    "UPDATE credentials SET secret = ?1, updated_at = ?2 WHERE id = ?3",
                    params![ciphertext, now, id.as_str()],
                )
                .map_err(map_sql_err)?;
            if updated == 0 {
                // Dropping the transaction rolls everything back.
                return Err(Error::NotFound(format!("Record not found: {}", id)));
            }
        }

        tx.commit().map_err(map_sql_err)?;

        debug!(
            settings = changes.settings().len(),
            secrets = changes.secrets().len(),
            "Change set committed"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_record(&self, record: &CredentialRecord) -> Result<()> {
        self.conn()?
            .execute(
                r#"
                INSERT INTO credentials
                (id, label, host, port, protocol, username, secret, notes, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    label = excluded.label,
                    host = excluded.host,
                    port = excluded.port,
                    protocol = excluded.protocol,
                    username = excluded.username,
                    notes = excluded.notes,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.id.as_str(),
                    record.label,
                    record.host,
                    i64::from(record.port),
                    record.protocol,
                    record.username,
                    record.notes,
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(map_sql_err)?;
        debug!(id = %record.id, "Record saved");
        Ok(())
    }

    async fn get_record(&self, id: &RecordId) -> Result<Option<CredentialRecord>> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM credentials WHERE id = ?1", RECORD_COLUMNS),
                params![id.as_str()],
                raw_record,
            )
            .optional()
            .map_err(map_sql_err)?;
        row.map(CredentialRecord::try_from).transpose()
    }

    async fn list_records(&self) -> Result<Vec<CredentialRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM credentials ORDER BY label, id",
                RECORD_COLUMNS
            ))
            .map_err(map_sql_err)?;
        let rows = stmt.query_map([], raw_record).map_err(map_sql_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(CredentialRecord::try_from(row.map_err(map_sql_err)?)?);
        }
        Ok(records)
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM credentials WHERE id = ?1", params![id.as_str()])
            .map_err(map_sql_err)?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Record not found: {}", id)));
        }
        debug!(id = %id, "Record deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> CredentialRecord {
        CredentialRecord::new(
            RecordId::new(id).unwrap(),
            format!("label-{}", id),
            "db.internal",
            3389,
            "RDP",
            "svc",
        )
    }

    async fn seed(store: &SqliteStore, id: &str, secret: Option<&str>) {
        store.upsert_record(&record(id)).await.unwrap();
        if let Some(secret) = secret {
            store
                .write_secret_field(&RecordId::new(id).unwrap(), Some(secret))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();

        store.set_setting("EncryptionCheck", "c1").await.unwrap();
        store.set_setting("EncryptionCheck", "c2").await.unwrap();
        assert_eq!(
            store.get_setting("EncryptionCheck").await.unwrap().as_deref(),
            Some("c2")
        );
        store.remove_setting("EncryptionCheck").await.unwrap();
        assert_eq!(store.get_setting("EncryptionCheck").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            seed(&store, "r1", Some("ct")).await;
            store.set_setting("EncryptionSalt", "s").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store
            .get_record(&RecordId::new("r1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.label, "label-r1");
        assert_eq!(loaded.port, 3389);
        assert_eq!(loaded.secret.as_deref(), Some("ct"));
        assert_eq!(
            store.get_setting("EncryptionSalt").await.unwrap().as_deref(),
            Some("s")
        );
    }

    #[tokio::test]
    async fn test_secret_fields_skip_empty() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "a", Some("ct-a")).await;
        seed(&store, "b", None).await;
        seed(&store, "c", Some("")).await;

        let fields = store.secret_fields().await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_secret_field_read_write() {
        let store = SqliteStore::in_memory().unwrap();
        let id = RecordId::new("a").unwrap();
        seed(&store, "a", None).await;

        assert_eq!(store.read_secret_field(&id).await.unwrap(), None);
        store.write_secret_field(&id, Some("ct")).await.unwrap();
        assert_eq!(store.read_secret_field(&id).await.unwrap().as_deref(), Some("ct"));
        store.write_secret_field(&id, None).await.unwrap();
        assert_eq!(store.read_secret_field(&id).await.unwrap(), None);

        let ghost = RecordId::new("ghost").unwrap();
        assert!(matches!(
            store.write_secret_field(&ghost, Some("x")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.read_secret_field(&ghost).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_rolls_back_on_unknown_record() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "a", Some("old-a")).await;
        store.set_setting("EncryptionSalt", "old").await.unwrap();

        let mut changes = ChangeSet::new();
        changes
            .set_setting("EncryptionSalt", "new")
            .rewrite_secret(RecordId::new("a").unwrap(), "new-a")
            .rewrite_secret(RecordId::new("ghost").unwrap(), "x");

        assert!(matches!(store.apply(changes).await, Err(Error::NotFound(_))));
        assert_eq!(
            store.get_setting("EncryptionSalt").await.unwrap().as_deref(),
            Some("old")
        );
        assert_eq!(
            store
                .read_secret_field(&RecordId::new("a").unwrap())
                .await
                .unwrap()
                .as_deref(),
            Some("old-a")
        );
    }

    #[tokio::test]
    async fn test_apply_commits() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "a", Some("old-a")).await;

        let mut changes = ChangeSet::new();
        changes
            .set_setting("EncryptionSalt", "new")
            .rewrite_secret(RecordId::new("a").unwrap(), "new-a");
        store.apply(changes).await.unwrap();

        assert_eq!(
            store.get_setting("EncryptionSalt").await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(
            store
                .read_secret_field(&RecordId::new("a").unwrap())
                .await
                .unwrap()
                .as_deref(),
            Some("new-a")
        );
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "b", None).await;
        seed(&store, "a", None).await;

        let ids: Vec<_> = store
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        store.delete_record(&RecordId::new("a").unwrap()).await.unwrap();
        assert!(store
            .delete_record(&RecordId::new("a").unwrap())
            .await
            .is_err());
        assert_eq!(store.list_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_stored_secret() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store, "a", Some("ct-a")).await;

        let mut edited = store
            .get_record(&RecordId::new("a").unwrap())
            .await
            .unwrap()
            .unwrap();
        edited.port = 22;
        edited.secret = Some("stale".to_string());
        store.upsert_record(&edited).await.unwrap();

        let loaded = store.get_record(&edited.id).await.unwrap().unwrap();
        assert_eq!(loaded.port, 22);
        assert_eq!(loaded.secret.as_deref(), Some("ct-a"));

        let mut fresh = record("b");
        fresh.secret = Some("ignored".to_string());
        store.upsert_record(&fresh).await.unwrap();
        assert_eq!(
            store
                .read_secret_field(&RecordId::new("b").unwrap())
                .await
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("vault.db");

        SqliteStore::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_under_a_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = SqliteStore::open(blocker.join("vault.db"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
