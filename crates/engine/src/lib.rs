pub mod config;
pub mod conflict;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod ordering;
pub mod validate;

pub use config::EditConfig;
pub use conflict::{ChildResolver, CompositeRegistry, ConflictChecker};
pub use error::EngineError;
pub use ledger::{ValueSource, VersionLedger, clean_text, snapshot_text};
pub use messages::Locale;
pub use ordering::OrderingService;

use std::sync::Arc;

use serde::Serialize;

use scriptdesk_core::{
    AuditAction, Caller, Clock, Direction, EditPayload, EditorPresence, EditorToken, EntityId,
    EntityType, FieldErrors, LeaseCache,
};
use scriptdesk_storage::{
    AuditRecord, DraftRecord, EDGE_FACTION_MEMBER, EDGE_PLOT_CHARACTER, EDGE_RELATIONSHIP,
    EntityAccess, EntityRecord, SqliteStorage, Storage, StorageError, VersionRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AjaxStatus {
    Ok,
    Ko,
}

/// Reply to background requests (heartbeat, autosave). Never carries entity
/// content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AjaxResponse {
    pub res: AjaxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn: Option<String>,
    /// Id of the entity created by the first autosave of a new form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<EntityId>,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub errors: FieldErrors,
}

impl AjaxResponse {
    pub fn ok() -> Self {
        Self {
            res: AjaxStatus::Ok,
            warn: None,
            draft_id: None,
            errors: FieldErrors::new(),
        }
    }

    pub fn ko(errors: FieldErrors) -> Self {
        Self {
            res: AjaxStatus::Ko,
            errors,
            ..Self::ok()
        }
    }

    fn with_warning(mut self, warn: Option<String>) -> Self {
        self.warn = warn;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.res == AjaxStatus::Ok
    }
}

/// Result of an explicit save or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub success: bool,
    /// Saved entity, or the removed one for deletions.
    pub entity: Option<EntityRecord>,
    pub version: Option<VersionRecord>,
    pub errors: FieldErrors,
    pub message: Option<String>,
}

impl CommitOutcome {
    fn invalid(errors: FieldErrors) -> Self {
        Self {
            success: false,
            entity: None,
            version: None,
            errors,
            message: None,
        }
    }

    fn noop() -> Self {
        Self {
            success: true,
            ..Self::invalid(FieldErrors::new())
        }
    }
}

/// Run `f` inside one IMMEDIATE transaction, rolling back on any error.
fn transaction<T>(
    storage: &mut SqliteStorage,
    f: impl FnOnce(&mut SqliteStorage) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    exec_batch(storage, "BEGIN IMMEDIATE")?;
    match f(storage) {
        Ok(value) => {
            if let Err(e) = exec_batch(storage, "COMMIT") {
                let _ = exec_batch(storage, "ROLLBACK");
                return Err(e);
            }
            Ok(value)
        }
        Err(e) => {
            let _ = exec_batch(storage, "ROLLBACK");
            Err(e)
        }
    }
}

fn exec_batch(storage: &SqliteStorage, sql: &str) -> Result<(), EngineError> {
    storage
        .conn()
        .execute_batch(sql)
        .map_err(|e| EngineError::Storage(StorageError::Sqlite(e)))
}

/// Edit-session controller. Drives every entity through
/// NEW -> DRAFT -> COMMITTED -> DELETED, coupling entity writes with the
/// version ledger and the audit log.
pub struct Engine {
    storage: SqliteStorage,
    config: EditConfig,
    clock: Arc<dyn Clock>,
    checker: ConflictChecker,
    ledger: VersionLedger,
}

impl Engine {
    pub fn new(
        storage: SqliteStorage,
        cache: Arc<dyn LeaseCache>,
        clock: Arc<dyn Clock>,
        config: EditConfig,
    ) -> Self {
        let checker = ConflictChecker::new(
            cache,
            clock.clone(),
            config.lease_ttl(),
            config.cache_ttl(),
            config.locale,
        );
        let ledger = VersionLedger::new(config.version_retry_limit);
        Self {
            storage,
            config,
            clock,
            checker,
            ledger,
        }
    }

    /// Engine over the configured database file, or an in-memory database
    /// when none is set.
    pub fn open(
        config: EditConfig,
        cache: Arc<dyn LeaseCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let storage = match &config.database_path {
            Some(path) => {
                let path = path.to_str().ok_or_else(|| {
                    EngineError::Config(format!("database path is not UTF-8: {}", path.display()))
                })?;
                SqliteStorage::open(path)?
            }
            None => SqliteStorage::open_in_memory()?,
        };
        tracing::info!(
            database = ?config.database_path,
            locale = config.locale.as_str(),
            "edit engine opened"
        );
        Ok(Self::new(storage, cache, clock, config))
    }

    pub fn with_composites(mut self, registry: CompositeRegistry) -> Self {
        self.checker = self.checker.with_registry(registry);
        self
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    fn now(&self) -> i64 {
        i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX)
    }

    /// Entity of the caller's tenant, drafts included.
    fn require_entity(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<EntityRecord, EngineError> {
        self.storage
            .find_entity(caller.tenant_id, entity_type, entity_id)?
            .ok_or(EngineError::NotFound)
    }

    /// Message shown to a user for an error.
    pub fn user_message(&self, error: &EngineError) -> String {
        match error {
            EngineError::NotFound => self.config.locale.not_found(),
            _ => self.config.locale.operation_failed(),
        }
    }

    // ========================================================================
    // Background requests
    // ========================================================================

    /// Periodic "still editing" ping from an open form.
    pub fn heartbeat(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
        token: Option<&EditorToken>,
    ) -> Result<AjaxResponse, EngineError> {
        self.require_entity(caller, entity_type, entity_id)?;
        let warn =
            self.checker
                .check_and_register(&self.storage, caller, entity_type, entity_id, token);
        Ok(AjaxResponse::ok().with_warning(warn))
    }

    /// Background save of an open form.
    ///
    /// A conflict is reported without persisting anything. A new form gets a
    /// `temp` row, a draft row is overwritten, and a committed entity gets a
    /// side draft while its canonical content stays untouched. Versions are
    /// never recorded here.
    pub fn autosave(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        payload: &EditPayload,
        token: Option<&EditorToken>,
    ) -> Result<AjaxResponse, EngineError> {
        let existing = match entity_id {
            Some(id) => Some(self.require_entity(caller, entity_type, id)?),
            None => None,
        };

        let errors = validate::validate_payload(
            &self.storage,
            caller.tenant_id,
            entity_type,
            payload,
            self.config.locale,
        )?;
        if !errors.is_empty() {
            tracing::debug!(entity_type = %entity_type, "autosave rejected by validation");
            return Ok(AjaxResponse::ko(errors));
        }

        if let Some(entity) = &existing {
            let warn = self.checker.check_and_register(
                &self.storage,
                caller,
                entity_type,
                entity.entity_id,
                token,
            );
            if warn.is_some() {
                return Ok(AjaxResponse::ok().with_warning(warn));
            }
        }

        let now = self.now();
        let tenant_id = caller.tenant_id;
        let author = caller.display_name.clone();
        let response = match existing {
            None => {
                let entity_id = transaction(&mut self.storage, |storage| {
                    let order = storage.next_order(tenant_id, entity_type, &payload.group)?;
                    Ok(storage.insert_entity(tenant_id, entity_type, payload, true, order, now)?)
                })?;
                tracing::debug!(entity_type = %entity_type, entity_id = %entity_id, "draft created");
                // Claim the new entity so others opening it are warned.
                self.checker
                    .check_and_register(&self.storage, caller, entity_type, entity_id, token);
                AjaxResponse {
                    draft_id: Some(entity_id),
                    ..AjaxResponse::ok()
                }
            }
            Some(entity) => {
                let id = entity.entity_id;
                // The row may have been committed or deleted since it was read.
                let updated_in_place = transaction(&mut self.storage, |storage| {
                    if entity.temp && storage.update_draft(id, payload, now)? {
                        return Ok(true);
                    }
                    storage
                        .find_entity(tenant_id, entity_type, id)?
                        .ok_or(EngineError::NotFound)?;
                    storage.save_draft(&DraftRecord {
                        entity_type,
                        entity_id: id,
                        author,
                        payload: payload.clone(),
                        saved_at: now,
                    })?;
                    Ok(false)
                })?;
                if updated_in_place {
                    tracing::debug!(entity_type = %entity_type, entity_id = %id, "draft updated");
                } else {
                    tracing::debug!(entity_type = %entity_type, entity_id = %id, "side draft saved");
                }
                AjaxResponse::ok()
            }
        };
        Ok(response)
    }

    /// Sessions currently editing the entity, as a read-only view.
    pub fn active_editors(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<EditorPresence>, EngineError> {
        self.require_entity(caller, entity_type, entity_id)?;
        Ok(self
            .checker
            .active_editors(caller.tenant_id, entity_type, entity_id))
    }

    // ========================================================================
    // Explicit save / delete
    // ========================================================================

    /// Explicit form submission. With `delete` set the entity is removed
    /// instead, after its final version is recorded.
    pub fn commit(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        payload: &EditPayload,
        delete: bool,
    ) -> Result<CommitOutcome, EngineError> {
        if delete {
            return match entity_id {
                Some(id) => self.delete(caller, entity_type, id),
                None => Ok(CommitOutcome::noop()),
            };
        }
        self.save(caller, entity_type, entity_id, payload)
    }

    fn save(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        payload: &EditPayload,
    ) -> Result<CommitOutcome, EngineError> {
        let existing = match entity_id {
            Some(id) => Some(self.require_entity(caller, entity_type, id)?),
            None => None,
        };

        let errors = validate::validate_payload(
            &self.storage,
            caller.tenant_id,
            entity_type,
            payload,
            self.config.locale,
        )?;
        if !errors.is_empty() {
            let fields: Vec<&str> = errors.fields().collect();
            tracing::debug!(entity_type = %entity_type, ?fields, "save rejected by validation");
            return Ok(CommitOutcome::invalid(errors));
        }

        let now = self.now();
        let tenant_id = caller.tenant_id;
        let author = caller.display_name.as_str();
        let ledger = &self.ledger;

        let (entity, version, action) = transaction(&mut self.storage, |storage| {
            let (entity_id, action) = match &existing {
                Some(entity) => {
                    // Decide NEW vs UPDATE under the write lock: another worker
                    // may have committed or deleted the draft meanwhile.
                    let current = storage
                        .find_entity(tenant_id, entity_type, entity.entity_id)?
                        .ok_or(EngineError::NotFound)?;
                    storage.update_entity(current.entity_id, payload, false, now)?;
                    storage.clear_draft(entity_type, current.entity_id)?;
                    let action = if current.temp {
                        AuditAction::New
                    } else {
                        AuditAction::Update
                    };
                    (current.entity_id, action)
                }
                None => {
                    let order = storage.next_order(tenant_id, entity_type, &payload.group)?;
                    let id = storage.insert_entity(tenant_id, entity_type, payload, false, order, now)?;
                    (id, AuditAction::New)
                }
            };
            let entity = storage
                .get_entity(entity_id)?
                .ok_or(EngineError::NotFound)?;
            let version = ledger.snapshot(storage, &entity, author, false, now)?;
            storage.insert_audit(&AuditRecord {
                tenant_id,
                entity_type,
                entity_id,
                action,
                author: author.to_string(),
                created_at: now,
            })?;
            Ok((entity, version, action))
        })?;

        tracing::info!(
            tenant = %tenant_id,
            entity_type = %entity_type,
            entity_id = %entity.entity_id,
            version = version.version,
            action = action.as_str(),
            "entity committed"
        );
        let message = self.config.locale.saved(entity_type, &entity.name);
        Ok(CommitOutcome {
            success: true,
            entity: Some(entity),
            version: Some(version),
            errors: FieldErrors::new(),
            message: Some(message),
        })
    }

    fn delete(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<CommitOutcome, EngineError> {
        let now = self.now();
        let tenant_id = caller.tenant_id;
        let author = caller.display_name.as_str();
        let ledger = &self.ledger;

        // The row is read under the write lock so that concurrent deletes
        // record a single final version.
        let deleted = transaction(&mut self.storage, |storage| {
            let Some(entity) = storage.find_entity(tenant_id, entity_type, entity_id)? else {
                tracing::debug!(entity_type = %entity_type, entity_id = %entity_id, "delete of absent entity ignored");
                return Ok(None);
            };
            if entity.temp {
                // Never committed: nothing to record, just drop the draft row.
                storage.delete_entity(entity_id)?;
                tracing::debug!(entity_type = %entity_type, entity_id = %entity_id, "uncommitted draft discarded");
                return Ok(None);
            }
            let version = ledger.snapshot(storage, &entity, author, true, now)?;
            storage.insert_audit(&AuditRecord {
                tenant_id,
                entity_type,
                entity_id,
                action: AuditAction::Delete,
                author: author.to_string(),
                created_at: now,
            })?;
            storage.delete_entity(entity_id)?;
            Ok(Some((entity, version)))
        })?;
        let Some((entity, version)) = deleted else {
            return Ok(CommitOutcome::noop());
        };

        tracing::info!(
            tenant = %entity.tenant_id,
            entity_type = %entity_type,
            entity_id = %entity_id,
            version = version.version,
            "entity deleted"
        );
        let message = self.config.locale.deleted(entity_type, &entity.name);
        Ok(CommitOutcome {
            success: true,
            entity: Some(entity),
            version: Some(version),
            errors: FieldErrors::new(),
            message: Some(message),
        })
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    pub fn reorder(
        &mut self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
        direction: Direction,
    ) -> Result<EntityRecord, EngineError> {
        let entity = self.require_entity(caller, entity_type, entity_id)?;
        transaction(&mut self.storage, |storage| {
            Ok(OrderingService::move_entity(storage, &entity, direction)?)
        })
    }

    // ========================================================================
    // Relations
    // ========================================================================

    fn link(
        &mut self,
        caller: &Caller,
        edge_type: &str,
        source: (EntityType, EntityId),
        target: (EntityType, EntityId),
        text: &str,
    ) -> Result<i64, EngineError> {
        self.require_entity(caller, source.0, source.1)?;
        self.require_entity(caller, target.0, target.1)?;
        let edge_id = self.storage.insert_edge(edge_type, source.1, target.1, text)?;
        tracing::debug!(edge_type, source = %source.1, target = %target.1, "edge created");
        Ok(edge_id)
    }

    /// Character to character relation with a free-text description.
    pub fn add_relationship(
        &mut self,
        caller: &Caller,
        from: EntityId,
        to: EntityId,
        text: &str,
    ) -> Result<i64, EngineError> {
        if from == to {
            return Err(EngineError::Validation("a character cannot relate to itself".into()));
        }
        self.link(
            caller,
            EDGE_RELATIONSHIP,
            (EntityType::Character, from),
            (EntityType::Character, to),
            text,
        )
    }

    /// Attach a character to a plot, with the character's part in it.
    pub fn attach_character(
        &mut self,
        caller: &Caller,
        plot: EntityId,
        character: EntityId,
        text: &str,
    ) -> Result<i64, EngineError> {
        self.link(
            caller,
            EDGE_PLOT_CHARACTER,
            (EntityType::Plot, plot),
            (EntityType::Character, character),
            text,
        )
    }

    pub fn add_faction_member(
        &mut self,
        caller: &Caller,
        faction: EntityId,
        character: EntityId,
    ) -> Result<i64, EngineError> {
        self.link(
            caller,
            EDGE_FACTION_MEMBER,
            (EntityType::Faction, faction),
            (EntityType::Character, character),
            "",
        )
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Canonical content. Uncommitted drafts read as absent.
    pub fn get_entity(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<EntityRecord, EngineError> {
        self.require_entity(caller, entity_type, entity_id)
            .and_then(|e| if e.temp { Err(EngineError::NotFound) } else { Ok(e) })
    }

    /// Content for the editing form, uncommitted drafts included.
    pub fn get_entity_for_edit(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<EntityRecord, EngineError> {
        self.require_entity(caller, entity_type, entity_id)
    }

    /// Pending autosave of a committed entity.
    pub fn load_draft(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<DraftRecord>, EngineError> {
        self.require_entity(caller, entity_type, entity_id)?;
        Ok(self.storage.get_draft(entity_type, entity_id)?)
    }

    pub fn list_entities(
        &self,
        caller: &Caller,
        entity_type: EntityType,
    ) -> Result<Vec<EntityRecord>, EngineError> {
        Ok(self.storage.list_entities(caller.tenant_id, entity_type, false)?)
    }

    /// Audit trail of an entity, still readable after deletion. Ownership is
    /// established through the audit log since the row may be gone.
    pub fn audit_entries(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<AuditRecord>, EngineError> {
        let entries = self.storage.get_audit_entries(entity_type, entity_id)?;
        if entries.is_empty() || entries.iter().any(|e| e.tenant_id != caller.tenant_id) {
            return Err(EngineError::NotFound);
        }
        Ok(entries)
    }

    /// Version history, oldest first.
    pub fn versions(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<VersionRecord>, EngineError> {
        self.audit_entries(caller, entity_type, entity_id)?;
        Ok(self.storage.get_versions(entity_type, entity_id)?)
    }

    pub fn version(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
        version: i64,
    ) -> Result<VersionRecord, EngineError> {
        self.audit_entries(caller, entity_type, entity_id)?;
        self.storage
            .get_version(entity_type, entity_id, version)?
            .ok_or(EngineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptdesk_core::{ManualClock, MemoryLeaseCache, TenantId};

    fn engine() -> (Engine, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let cache = Arc::new(MemoryLeaseCache::new(Arc::new(clock.clone())));
        let engine = Engine::new(
            SqliteStorage::open_in_memory().unwrap(),
            cache,
            Arc::new(clock.clone()),
            EditConfig::default(),
        );
        (engine, clock)
    }

    fn writer() -> Caller {
        Caller::new(TenantId::new(1), "Prospero")
    }

    #[test]
    fn ajax_response_serializes_minimal_shape() {
        let json = serde_json::to_value(AjaxResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({ "res": "ok" }));

        let warned = AjaxResponse::ok().with_warning(Some("careful".into()));
        let json = serde_json::to_value(warned).unwrap();
        assert_eq!(json, serde_json::json!({ "res": "ok", "warn": "careful" }));

        let mut errors = FieldErrors::new();
        errors.add("name", "required");
        let json = serde_json::to_value(AjaxResponse::ko(errors)).unwrap();
        assert_eq!(json, serde_json::json!({ "res": "ko", "errors": { "name": ["required"] } }));
    }

    #[test]
    fn open_uses_configured_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EditConfig {
            database_path: Some(dir.path().join("desk.db")),
            ..EditConfig::default()
        };
        let clock = ManualClock::new(1_000_000);
        let cache = Arc::new(MemoryLeaseCache::new(Arc::new(clock.clone())));
        let caller = writer();

        let mut engine = Engine::open(config.clone(), cache.clone(), Arc::new(clock.clone())).unwrap();
        let id = engine
            .commit(&caller, EntityType::Handout, None, &EditPayload::named("Map"), false)
            .unwrap()
            .entity
            .unwrap()
            .entity_id;
        drop(engine);

        let reopened = Engine::open(config, cache, Arc::new(clock)).unwrap();
        assert_eq!(reopened.get_entity(&caller, EntityType::Handout, id).unwrap().name, "Map");
    }

    #[test]
    fn open_rejects_invalid_config() {
        let clock = ManualClock::new(0);
        let cache = Arc::new(MemoryLeaseCache::new(Arc::new(clock.clone())));
        let config = EditConfig {
            lease_ttl_secs: 0,
            ..EditConfig::default()
        };
        assert!(matches!(
            Engine::open(config, cache, Arc::new(clock)),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn save_then_update_records_new_then_update() {
        let (mut engine, _) = engine();
        let caller = writer();
        let created = engine
            .commit(&caller, EntityType::Quest, None, &EditPayload::named("Find the staff"), false)
            .unwrap();
        assert!(created.success);
        let id = created.entity.unwrap().entity_id;
        assert_eq!(created.message.as_deref(), Some("Quest \"Find the staff\" saved"));

        engine
            .commit(&caller, EntityType::Quest, Some(id), &EditPayload::named("Break the staff"), false)
            .unwrap();
        let actions: Vec<AuditAction> = engine
            .audit_entries(&caller, EntityType::Quest, id)
            .unwrap()
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::New, AuditAction::Update]);
        assert_eq!(engine.versions(&caller, EntityType::Quest, id).unwrap().len(), 2);
    }

    #[test]
    fn invalid_payload_changes_nothing() {
        let (mut engine, _) = engine();
        let caller = writer();
        let outcome = engine
            .commit(&caller, EntityType::Trait, None, &EditPayload::named(""), false)
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors.get("name").is_some());
        assert!(engine.list_entities(&caller, EntityType::Trait).unwrap().is_empty());

        let ajax = engine
            .autosave(&caller, EntityType::Trait, None, &EditPayload::named(""), None)
            .unwrap();
        assert_eq!(ajax.res, AjaxStatus::Ko);
        assert!(ajax.draft_id.is_none());
    }

    #[test]
    fn delete_of_missing_entity_is_silent() {
        let (mut engine, _) = engine();
        let outcome = engine
            .commit(&writer(), EntityType::Plot, Some(EntityId::new(404)), &EditPayload::default(), true)
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.version.is_none());
    }

    #[test]
    fn autosave_draft_is_hidden_from_canonical_reads() {
        let (mut engine, _) = engine();
        let caller = writer();
        let token = EditorToken::new("tok");
        let res = engine
            .autosave(&caller, EntityType::Prologue, None, &EditPayload::named("Before"), Some(&token))
            .unwrap();
        let id = res.draft_id.unwrap();
        assert!(matches!(
            engine.get_entity(&caller, EntityType::Prologue, id),
            Err(EngineError::NotFound)
        ));
        assert!(engine.get_entity_for_edit(&caller, EntityType::Prologue, id).unwrap().temp);
        assert!(engine.list_entities(&caller, EntityType::Prologue).unwrap().is_empty());
    }

    #[test]
    fn user_message_hides_error_details() {
        let (engine, _) = engine();
        assert_eq!(engine.user_message(&EngineError::NotFound), Locale::En.not_found());
        let other = EngineError::Validation("x".into());
        assert_eq!(engine.user_message(&other), Locale::En.operation_failed());
    }

    #[test]
    fn relationship_to_self_is_rejected() {
        let (mut engine, _) = engine();
        let caller = writer();
        let id = engine
            .commit(&caller, EntityType::Character, None, &EditPayload::named("Ariel"), false)
            .unwrap()
            .entity
            .unwrap()
            .entity_id;
        assert!(matches!(
            engine.add_relationship(&caller, id, id, "mirror"),
            Err(EngineError::Validation(_))
        ));
    }
}
