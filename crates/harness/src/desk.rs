use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use scriptdesk_core::{
    CacheError, Caller, EditPayload, EditorToken, EntityId, EntityType, FieldValue, LeaseCache,
    ManualClock, MemoryLeaseCache, OrderGroup, QuestionKind, TenantId,
};
use scriptdesk_engine::{EditConfig, Engine};
use scriptdesk_storage::{QUESTION_KIND_FIELD, SqliteStorage, StorageError};

pub const TENANT: TenantId = TenantId::new(1);

/// Single engine over an in-memory database, a manual clock and an
/// in-process lease cache.
pub struct TestDesk {
    pub clock: ManualClock,
    pub cache: Arc<MemoryLeaseCache>,
    pub engine: Engine,
}

impl TestDesk {
    pub fn new() -> Result<Self, StorageError> {
        Self::with_config(EditConfig::default())
    }

    pub fn with_config(config: EditConfig) -> Result<Self, StorageError> {
        let clock = ManualClock::new(1_700_000_000_000);
        let cache = Arc::new(MemoryLeaseCache::new(Arc::new(clock.clone())));
        let engine = Engine::new(
            SqliteStorage::open_in_memory()?,
            cache.clone(),
            Arc::new(clock.clone()),
            config,
        );
        Ok(Self {
            clock,
            cache,
            engine,
        })
    }

    /// Desk whose lease cache can be taken down and restarted.
    pub fn with_failing_cache() -> Result<(Self, Arc<FailingLeaseCache>), StorageError> {
        let mut desk = Self::new()?;
        let cache = Arc::new(FailingLeaseCache::new(desk.clock.clone()));
        desk.engine = Engine::new(
            SqliteStorage::open_in_memory()?,
            cache.clone(),
            Arc::new(desk.clock.clone()),
            EditConfig::default(),
        );
        Ok((desk, cache))
    }

    pub fn caller(&self, name: &str) -> Caller {
        Caller::new(TENANT, name)
    }

    /// A caller plus a fresh editing-session token.
    pub fn session(&self, name: &str) -> (Caller, EditorToken) {
        (self.caller(name), EditorToken::generate())
    }

    /// Commit a new entity, failing on validation errors.
    pub fn create(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        payload: EditPayload,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        let outcome = self.engine.commit(caller, entity_type, None, &payload, false)?;
        match outcome.entity {
            Some(entity) if outcome.success => Ok(entity.entity_id),
            _ => Err(format!("create rejected: {:?}", outcome.errors).into()),
        }
    }

    pub fn create_named(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        name: &str,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        self.create(caller, entity_type, EditPayload::named(name))
    }

    /// Commit a form question applicable to `applicable`.
    pub fn create_question(
        &mut self,
        caller: &Caller,
        applicable: EntityType,
        name: &str,
        kind: QuestionKind,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        let payload = EditPayload::named(name)
            .with_field(QUESTION_KIND_FIELD, FieldValue::Text(kind.as_str().into()))
            .with_group(OrderGroup {
                applicable: Some(applicable),
                ..OrderGroup::default()
            });
        self.create(caller, EntityType::Question, payload)
    }

    pub fn create_option(
        &mut self,
        caller: &Caller,
        question_id: EntityId,
        name: &str,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        let payload = EditPayload::named(name).with_group(OrderGroup {
            question_id: Some(question_id),
            ..OrderGroup::default()
        });
        self.create(caller, EntityType::QuestionOption, payload)
    }
}

/// Lease cache that can be switched off to simulate an outage.
pub struct FailingLeaseCache {
    inner: MemoryLeaseCache,
    down: AtomicBool,
}

impl FailingLeaseCache {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            inner: MemoryLeaseCache::new(Arc::new(clock)),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Lose every entry, as a cache restart would.
    pub fn restart(&self) {
        self.inner.clear();
    }

    fn available(&self) -> Result<&MemoryLeaseCache, CacheError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".into()));
        }
        Ok(&self.inner)
    }
}

impl LeaseCache for FailingLeaseCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.available()?.get(key)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.available()?.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.available()?.delete(key)
    }
}
