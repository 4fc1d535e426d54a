use crate::error::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Int(i64),
    Bytes(Vec<u8>),
}

/// Key/value store with TTL and atomic increment.
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// `ttl = None` keeps the entry until it is deleted or the store is cleared.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()>;

    fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically add `delta`. Fails with `Missing` or `NotNumeric`.
    fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    fn clear(&self) -> Result<()>;
}

struct Entry {
    value: CacheValue,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires.is_none_or(|at| Instant::now() < at)
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live() => match &mut entry.value {
                CacheValue::Int(current) => {
                    *current += delta;
                    Ok(*current)
                }
                CacheValue::Bytes(_) => Err(Error::NotNumeric(key.to_string())),
            },
            _ => Err(Error::Missing(key.to_string())),
        }
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Stores nothing. Every read misses and every increment fails as `Missing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl CacheStore for NullStore {
    fn name(&self) -> &'static str {
        "none"
    }

    fn get(&self, _key: &str) -> Result<Option<CacheValue>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: CacheValue, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn incr(&self, key: &str, _delta: i64) -> Result<i64> {
        Err(Error::Missing(key.to_string()))
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// On-disk store shared by every process that opens the same file.
///
/// Integers and payloads live in separate columns so `incr` can tell a
/// counter from a cached payload.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                int_value INTEGER,
                blob_value BLOB,
                expires_at INTEGER
            );
            "#,
        )?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                r#"
                SELECT int_value, blob_value FROM cache_entries
                WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                "#,
                params![key, Self::now()],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(int), _)) => Some(CacheValue::Int(int)),
            Some((None, Some(bytes))) => Some(CacheValue::Bytes(bytes)),
            _ => None,
        })
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Self::now() + ttl.as_secs() as i64);
        let (int_value, blob_value) = match value {
            CacheValue::Int(i) => (Some(i), None),
            CacheValue::Bytes(bytes) => (None, Some(bytes)),
        };
        self.conn.lock().execute(
            r#"
            INSERT INTO cache_entries (key, int_value, blob_value, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                int_value = ?2,
                blob_value = ?3,
                expires_at = ?4
            "#,
            params![key, int_value, blob_value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let now = Self::now();
        let updated = conn
            .query_row(
                r#"
                UPDATE cache_entries SET int_value = int_value + ?2
                WHERE key = ?1 AND int_value IS NOT NULL
                  AND (expires_at IS NULL OR expires_at > ?3)
                RETURNING int_value
                "#,
                params![key, delta, now],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(value) = updated {
            return Ok(value);
        }
        let exists = conn
            .query_row(
                "SELECT 1 FROM cache_entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            Err(Error::NotNumeric(key.to_string()))
        } else {
            Err(Error::Missing(key.to_string()))
        }
    }

    fn clear(&self) -> Result<()> {
        self.conn.lock().execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn CacheStore) {
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("n", CacheValue::Int(0), None).unwrap();
        assert_eq!(store.incr("n", 1).unwrap(), 1);
        assert_eq!(store.incr("n", 2).unwrap(), 3);
        assert_eq!(store.get("n").unwrap(), Some(CacheValue::Int(3)));

        store
            .set("blob", CacheValue::Bytes(b"rows".to_vec()), None)
            .unwrap();
        assert!(matches!(store.incr("blob", 1), Err(Error::NotNumeric(_))));
        assert!(matches!(store.incr("nope", 1), Err(Error::Missing(_))));

        assert!(store.delete("blob").unwrap());
        assert!(!store.delete("blob").unwrap());
        store.clear().unwrap();
        assert_eq!(store.get("n").unwrap(), None);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_contract() {
        exercise(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store
            .set("short", CacheValue::Int(1), Some(Duration::from_millis(0)))
            .unwrap();
        assert_eq!(store.get("short").unwrap(), None);
        assert!(matches!(store.incr("short", 1), Err(Error::Missing(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_null_store_keeps_nothing() {
        let store = NullStore;
        store.set("k", CacheValue::Int(1), None).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(matches!(store.incr("k", 1), Err(Error::Missing(_))));
    }
}
