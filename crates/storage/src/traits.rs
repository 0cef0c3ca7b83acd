use scriptdesk_core::{
    edit::{AuditAction, EditPayload, OrderGroup},
    entity_type::EntityType,
    field_value::FieldValue,
    ids::*,
};

use crate::error::StorageError;

/// Character → character relation carrying a free-text description.
pub const EDGE_RELATIONSHIP: &str = "relationship";
/// Plot → character attachment carrying the character's part in the plot.
pub const EDGE_PLOT_CHARACTER: &str = "plot_character";
/// Faction → character membership.
pub const EDGE_FACTION_MEMBER: &str = "faction_member";

/// Field key of a question's kind (see `QuestionKind`).
pub const QUESTION_KIND_FIELD: &str = "kind";

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub tenant_id: TenantId,
    pub entity_type: EntityType,
    pub name: String,
    pub text: String,
    /// Unconfirmed autosave content that has never been committed.
    pub temp: bool,
    pub order: i64,
    pub group: OrderGroup,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub edge_id: i64,
    pub edge_type: String,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub text: String,
}

/// Immutable textual capture of an entity at commit or delete time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub version: i64,
    pub author: String,
    pub text: String,
    pub deleted: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub tenant_id: TenantId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub action: AuditAction,
    pub author: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub author: String,
    pub payload: EditPayload,
    pub saved_at: i64,
}

/// Read access to entities, their attributes and relations.
pub trait EntityAccess {
    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError>;

    /// Entity lookup scoped to tenant and type. A mismatch reads as absent.
    fn find_entity(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<EntityRecord>, StorageError>;

    fn list_entities(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        include_temp: bool,
    ) -> Result<Vec<EntityRecord>, StorageError>;

    fn get_field(
        &self,
        entity_id: EntityId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError>;

    fn get_edges_from(
        &self,
        entity_id: EntityId,
        edge_type: &str,
    ) -> Result<Vec<EdgeRecord>, StorageError>;

    fn get_edges_to(
        &self,
        entity_id: EntityId,
        edge_type: &str,
    ) -> Result<Vec<EdgeRecord>, StorageError>;

    /// Committed questions applicable to `applicable`, in display order.
    fn get_questions(
        &self,
        tenant_id: TenantId,
        applicable: EntityType,
    ) -> Result<Vec<EntityRecord>, StorageError>;

    fn get_answer(
        &self,
        question_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Option<String>, StorageError>;

    /// Names of the options selected for a question, in option order.
    fn get_choice_names(
        &self,
        question_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Vec<String>, StorageError>;

    /// Every entity sharing the ordering group of `entity`, itself included.
    fn get_order_group(&self, entity: &EntityRecord) -> Result<Vec<EntityRecord>, StorageError>;

    fn next_order(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        group: &OrderGroup,
    ) -> Result<i64, StorageError>;

    fn max_version(&self, entity_type: EntityType, entity_id: EntityId) -> Result<i64, StorageError>;

    fn get_versions(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<VersionRecord>, StorageError>;

    fn get_version(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        version: i64,
    ) -> Result<Option<VersionRecord>, StorageError>;

    fn get_draft(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<DraftRecord>, StorageError>;

    fn get_audit_entries(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<AuditRecord>, StorageError>;
}

/// Durable writes. Callers wrap related writes in one transaction.
pub trait Storage: EntityAccess {
    fn insert_entity(
        &mut self,
        tenant_id: TenantId,
        entity_type: EntityType,
        payload: &EditPayload,
        temp: bool,
        order: i64,
        now: i64,
    ) -> Result<EntityId, StorageError>;

    /// Overwrite the entity's content with `payload`.
    fn update_entity(
        &mut self,
        entity_id: EntityId,
        payload: &EditPayload,
        temp: bool,
        now: i64,
    ) -> Result<(), StorageError>;

    /// Overwrite an entity only while it is still an uncommitted draft.
    /// Returns `false`, writing nothing, once it has been committed.
    fn update_draft(
        &mut self,
        entity_id: EntityId,
        payload: &EditPayload,
        now: i64,
    ) -> Result<bool, StorageError>;

    fn delete_entity(&mut self, entity_id: EntityId) -> Result<(), StorageError>;

    fn set_order(&mut self, entity_id: EntityId, order: i64) -> Result<(), StorageError>;

    fn insert_edge(
        &mut self,
        edge_type: &str,
        source_id: EntityId,
        target_id: EntityId,
        text: &str,
    ) -> Result<i64, StorageError>;

    fn save_draft(&mut self, draft: &DraftRecord) -> Result<(), StorageError>;

    fn clear_draft(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<(), StorageError>;

    /// Append the next version for an entity. The number is allocated by the
    /// insert itself and guarded by the (entity_id, entity_type, version) key;
    /// collisions are retried up to `retry_limit` times.
    #[allow(clippy::too_many_arguments)]
    fn append_version(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        author: &str,
        text: &str,
        deleted: bool,
        now: i64,
        retry_limit: u32,
    ) -> Result<VersionRecord, StorageError>;

    fn insert_audit(&mut self, record: &AuditRecord) -> Result<(), StorageError>;
}
