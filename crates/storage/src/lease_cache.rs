use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use scriptdesk_core::{CacheError, Clock, LeaseCache};

use crate::error::StorageError;

/// Lease cache shared by every worker that opens the same database file.
pub struct SqliteLeaseCache {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteLeaseCache {
    pub fn open(path: &str, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_lease_cache_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_lease_cache_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Drop expired rows. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.now();
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM lease_cache WHERE expires_at <= ?1",
            rusqlite::params![now],
        )
        .map_err(unavailable)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|e| {
            tracing::error!("lease cache: connection lock poisoned: {e}");
            CacheError::Unavailable(e.to_string())
        })
    }

    fn now(&self) -> i64 {
        i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX)
    }
}

fn unavailable(e: rusqlite::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

impl LeaseCache for SqliteLeaseCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = self.now();
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM lease_cache WHERE cache_key = ?1 AND expires_at > ?2",
            rusqlite::params![key, now],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.now().saturating_add(ttl_ms);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO lease_cache (cache_key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            rusqlite::params![key, value, expires_at],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM lease_cache WHERE cache_key = ?1",
            rusqlite::params![key],
        )
        .map_err(unavailable)?;
        Ok(())
    }
}
