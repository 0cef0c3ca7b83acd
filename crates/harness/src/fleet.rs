use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use scriptdesk_core::{Caller, LeaseCache, ManualClock};
use scriptdesk_engine::{EditConfig, Engine};
use scriptdesk_storage::{SqliteLeaseCache, SqliteStorage, StorageError};

use crate::desk::TENANT;

/// Several workers sharing one database file and one file-backed lease
/// cache, like request handlers of a multi-process deployment.
pub struct TestFleet {
    dir: TempDir,
    pub clock: ManualClock,
    workers: Vec<Engine>,
}

impl TestFleet {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let fleet = Self {
            dir,
            clock: ManualClock::new(1_700_000_000_000),
            workers: Vec::new(),
        };
        // Create the schema before any worker races to do it.
        SqliteStorage::open(&fleet.db_path())?;
        Ok(fleet)
    }

    pub fn db_path(&self) -> String {
        self.path("desk.db")
    }

    pub fn cache_path(&self) -> String {
        self.path("leases.db")
    }

    fn path(&self, name: &str) -> String {
        let path: PathBuf = self.dir.path().join(name);
        path.to_string_lossy().into_owned()
    }

    /// A new engine with its own connections, not tracked by the fleet.
    pub fn open_worker(&self) -> Result<Engine, StorageError> {
        let cache: Arc<dyn LeaseCache> =
            Arc::new(SqliteLeaseCache::open(&self.cache_path(), Arc::new(self.clock.clone()))?);
        Ok(Engine::new(
            SqliteStorage::open(&self.db_path())?,
            cache,
            Arc::new(self.clock.clone()),
            EditConfig::default(),
        ))
    }

    pub fn add_worker(&mut self) -> Result<usize, StorageError> {
        let worker = self.open_worker()?;
        let index = self.workers.len();
        self.workers.push(worker);
        Ok(index)
    }

    pub fn worker(&self, index: usize) -> &Engine {
        &self.workers[index]
    }

    pub fn worker_mut(&mut self, index: usize) -> &mut Engine {
        &mut self.workers[index]
    }

    pub fn caller(&self, name: &str) -> Caller {
        Caller::new(TENANT, name)
    }

    /// Take the database write lock on a separate connection. Workers that
    /// start writing meanwhile queue up behind it until it is released.
    pub fn hold_write_lock(&self) -> Result<WriteLock, StorageError> {
        let storage = SqliteStorage::open(&self.db_path())?;
        storage.conn().execute_batch("BEGIN IMMEDIATE")?;
        Ok(WriteLock { storage })
    }
}

pub struct WriteLock {
    storage: SqliteStorage,
}

impl WriteLock {
    pub fn release(self) -> Result<(), StorageError> {
        self.storage.conn().execute_batch("COMMIT")?;
        Ok(())
    }
}
