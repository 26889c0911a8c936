// Credential storage backends

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};

use crate::utils::MutexExt;

/// Conventional key for the current access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Conventional key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Conventional key for the access token expiry
pub const EXPIRES_AT_KEY: &str = "expires_at";

/// Synchronous key/value persistence for token material.
///
/// The conventional keys are shared by the schemes; the store itself does
/// not interpret them.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// SQLite-backed persistent store.
///
/// Entries live in an `auth_kv` table scoped by namespace, so several
/// independent stores can share one database file. Database failures are
/// logged and treated as a missing key or a dropped write.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl SqliteStore {
    /// Open (or create) a store in the database at `path`
    pub fn open(path: &Path, namespace: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::from_connection(conn, namespace)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory(namespace: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn, namespace)
    }

    fn from_connection(conn: Connection, namespace: impl Into<String>) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS auth_kv (
                namespace TEXT NOT NULL,
                key       TEXT NOT NULL,
                value     TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.into(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn try_get(&self, key: &str) -> rusqlite::Result<Option<String>> {
        let conn = self.conn.lock_or_recover();
        conn.query_row(
            "SELECT value FROM auth_kv WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
            |row| row.get(0),
        )
        .optional()
    }

    fn try_set(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock_or_recover();
        conn.execute(
            "INSERT INTO auth_kv (namespace, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value",
            params![self.namespace, key, value],
        )?;
        Ok(())
    }

    fn try_remove(&self, key: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock_or_recover();
        conn.execute(
            "DELETE FROM auth_kv WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
        )?;
        Ok(())
    }

    fn try_clear(&self) -> rusqlite::Result<()> {
        let conn = self.conn.lock_or_recover();
        conn.execute(
            "DELETE FROM auth_kv WHERE namespace = ?1",
            params![self.namespace],
        )?;
        Ok(())
    }
}

impl CredentialStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        self.try_get(key).unwrap_or_else(|e| {
            tracing::error!(namespace = %self.namespace, key, error = %e, "Failed to read credential");
            None
        })
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.try_set(key, value) {
            tracing::error!(namespace = %self.namespace, key, error = %e, "Failed to write credential");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key) {
            tracing::error!(namespace = %self.namespace, key, error = %e, "Failed to remove credential");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.try_clear() {
            tracing::error!(namespace = %self.namespace, error = %e, "Failed to clear credentials");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn CredentialStore) {
        assert!(store.get(ACCESS_TOKEN_KEY).is_none());

        store.set(ACCESS_TOKEN_KEY, "token-1");
        store.set(REFRESH_TOKEN_KEY, "refresh-1");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("token-1"));

        store.set(ACCESS_TOKEN_KEY, "token-2");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("token-2"));

        store.remove(ACCESS_TOKEN_KEY);
        assert!(store.get(ACCESS_TOKEN_KEY).is_none());
        assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));

        store.clear();
        assert!(store.get(REFRESH_TOKEN_KEY).is_none());
    }

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sqlite_store_contract() {
        let store = SqliteStore::open_in_memory("default").unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("authfetch-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.sqlite3");
        let _ = std::fs::remove_file(&path);

        {
            let store = SqliteStore::open(&path, "default").unwrap();
            store.set(ACCESS_TOKEN_KEY, "persisted");
        }

        let store = SqliteStore::open(&path, "default").unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("persisted"));

        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sqlite_clear_is_namespaced() {
        let dir = std::env::temp_dir().join(format!("authfetch-ns-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.sqlite3");
        let _ = std::fs::remove_file(&path);

        let tenant_a = SqliteStore::open(&path, "tenant-a").unwrap();
        let tenant_b = SqliteStore::open(&path, "tenant-b").unwrap();
        tenant_a.set(ACCESS_TOKEN_KEY, "a");
        tenant_b.set(ACCESS_TOKEN_KEY, "b");

        tenant_a.clear();

        assert!(tenant_a.get(ACCESS_TOKEN_KEY).is_none());
        assert_eq!(tenant_b.get(ACCESS_TOKEN_KEY).as_deref(), Some("b"));

        drop(tenant_a);
        drop(tenant_b);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
