use rusqlite::{Connection, OptionalExtension, types::Value};

use scriptdesk_core::{
    edit::{AuditAction, EditPayload, OrderGroup},
    entity_type::EntityType,
    field_value::FieldValue,
    ids::*,
};

use crate::error::StorageError;
use crate::traits::{
    AuditRecord, DraftRecord, EdgeRecord, EntityAccess, EntityRecord, Storage, VersionRecord,
};

const ENTITY_COLUMNS: &str = "entity_id, tenant_id, entity_type, name, text, temp, ord, question_id, section_id, applicable, created_at, updated_at";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Column values of an `entities` row before type parsing.
struct RawEntity {
    entity_id: i64,
    tenant_id: i64,
    entity_type: String,
    name: String,
    text: String,
    temp: bool,
    ord: i64,
    question_id: Option<i64>,
    section_id: Option<i64>,
    applicable: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn read_raw_entity(row: &rusqlite::Row) -> rusqlite::Result<RawEntity> {
    Ok(RawEntity {
        entity_id: row.get(0)?,
        tenant_id: row.get(1)?,
        entity_type: row.get(2)?,
        name: row.get(3)?,
        text: row.get(4)?,
        temp: row.get(5)?,
        ord: row.get(6)?,
        question_id: row.get(7)?,
        section_id: row.get(8)?,
        applicable: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl RawEntity {
    fn into_record(self) -> Result<EntityRecord, StorageError> {
        let applicable = match self.applicable {
            Some(s) => Some(EntityType::parse(&s)?),
            None => None,
        };
        Ok(EntityRecord {
            entity_id: EntityId::new(self.entity_id),
            tenant_id: TenantId::new(self.tenant_id),
            entity_type: EntityType::parse(&self.entity_type)?,
            name: self.name,
            text: self.text,
            temp: self.temp,
            order: self.ord,
            group: OrderGroup {
                question_id: self.question_id.map(EntityId::new),
                section_id: self.section_id,
                applicable,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn raw_to_records(raws: Vec<RawEntity>) -> Result<Vec<EntityRecord>, StorageError> {
    raws.into_iter().map(RawEntity::into_record).collect()
}

fn read_edge(row: &rusqlite::Row) -> rusqlite::Result<EdgeRecord> {
    Ok(EdgeRecord {
        edge_id: row.get(0)?,
        edge_type: row.get(1)?,
        source_id: EntityId::new(row.get(2)?),
        target_id: EntityId::new(row.get(3)?),
        text: row.get(4)?,
    })
}

fn read_version(
    row: &rusqlite::Row,
) -> rusqlite::Result<(i64, String, i64, String, String, bool, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn version_from_tuple(
    (entity_id, entity_type, version, author, text, deleted, created_at): (
        i64,
        String,
        i64,
        String,
        String,
        bool,
        i64,
    ),
) -> Result<VersionRecord, StorageError> {
    Ok(VersionRecord {
        entity_id: EntityId::new(entity_id),
        entity_type: EntityType::parse(&entity_type)?,
        version,
        author,
        text,
        deleted,
        created_at,
    })
}

/// Write every part of `payload` that lives outside the `entities` row.
fn write_payload_details(
    conn: &Connection,
    entity_id: EntityId,
    payload: &EditPayload,
) -> Result<(), StorageError> {
    for (key, value) in &payload.fields {
        if value.is_null() {
            conn.execute(
                "DELETE FROM fields WHERE entity_id = ?1 AND field_key = ?2",
                rusqlite::params![entity_id.get(), key],
            )?;
            continue;
        }
        let value_bytes = value
            .to_msgpack()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        conn.execute(
            "INSERT INTO fields (entity_id, field_key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(entity_id, field_key) DO UPDATE SET value = excluded.value",
            rusqlite::params![entity_id.get(), key, value_bytes],
        )?;
    }

    for (question_id, text) in &payload.answers {
        if text.trim().is_empty() {
            conn.execute(
                "DELETE FROM answers WHERE question_id = ?1 AND entity_id = ?2",
                rusqlite::params![question_id.get(), entity_id.get()],
            )?;
        } else {
            conn.execute(
                "INSERT INTO answers (question_id, entity_id, text) VALUES (?1, ?2, ?3)
                 ON CONFLICT(question_id, entity_id) DO UPDATE SET text = excluded.text",
                rusqlite::params![question_id.get(), entity_id.get(), text],
            )?;
        }
    }

    for (question_id, options) in &payload.choices {
        conn.execute(
            "DELETE FROM choices WHERE question_id = ?1 AND entity_id = ?2",
            rusqlite::params![question_id.get(), entity_id.get()],
        )?;
        for option_id in options {
            conn.execute(
                "INSERT OR IGNORE INTO choices (question_id, entity_id, option_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![question_id.get(), entity_id.get(), option_id.get()],
            )?;
        }
    }
    Ok(())
}

impl EntityAccess for SqliteStorage {
    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1"),
                rusqlite::params![entity_id.get()],
                read_raw_entity,
            )
            .optional()?;
        raw.map(RawEntity::into_record).transpose()
    }

    fn find_entity(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<EntityRecord>, StorageError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1 AND tenant_id = ?2 AND entity_type = ?3"
                ),
                rusqlite::params![entity_id.get(), tenant_id.get(), entity_type.as_str()],
                read_raw_entity,
            )
            .optional()?;
        raw.map(RawEntity::into_record).transpose()
    }

    fn list_entities(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        include_temp: bool,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE tenant_id = ?1 AND entity_type = ?2 AND (?3 OR temp = 0)
             ORDER BY ord, entity_id"
        ))?;
        let raws = stmt
            .query_map(
                rusqlite::params![tenant_id.get(), entity_type.as_str(), include_temp],
                read_raw_entity,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw_to_records(raws)
    }

    fn get_field(
        &self,
        entity_id: EntityId,
        field_key: &str,
    ) -> Result<Option<FieldValue>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM fields WHERE entity_id = ?1 AND field_key = ?2",
                rusqlite::params![entity_id.get(), field_key],
                |row| row.get(0),
            )
            .optional()?;
        match bytes {
            Some(val_bytes) => {
                let value = FieldValue::from_msgpack(&val_bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn get_edges_from(
        &self,
        entity_id: EntityId,
        edge_type: &str,
    ) -> Result<Vec<EdgeRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT edge_id, edge_type, source_id, target_id, text FROM edges
             WHERE source_id = ?1 AND edge_type = ?2 ORDER BY edge_id",
        )?;
        let edges = stmt
            .query_map(rusqlite::params![entity_id.get(), edge_type], read_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn get_edges_to(
        &self,
        entity_id: EntityId,
        edge_type: &str,
    ) -> Result<Vec<EdgeRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT edge_id, edge_type, source_id, target_id, text FROM edges
             WHERE target_id = ?1 AND edge_type = ?2 ORDER BY edge_id",
        )?;
        let edges = stmt
            .query_map(rusqlite::params![entity_id.get(), edge_type], read_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn get_questions(
        &self,
        tenant_id: TenantId,
        applicable: EntityType,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE tenant_id = ?1 AND entity_type = ?2 AND applicable = ?3 AND temp = 0
             ORDER BY section_id, ord, entity_id"
        ))?;
        let raws = stmt
            .query_map(
                rusqlite::params![
                    tenant_id.get(),
                    EntityType::Question.as_str(),
                    applicable.as_str()
                ],
                read_raw_entity,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw_to_records(raws)
    }

    fn get_answer(
        &self,
        question_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Option<String>, StorageError> {
        let text = self
            .conn
            .query_row(
                "SELECT text FROM answers WHERE question_id = ?1 AND entity_id = ?2",
                rusqlite::params![question_id.get(), entity_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    fn get_choice_names(
        &self,
        question_id: EntityId,
        entity_id: EntityId,
    ) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT o.name FROM choices c JOIN entities o ON o.entity_id = c.option_id
             WHERE c.question_id = ?1 AND c.entity_id = ?2
             ORDER BY o.ord, o.entity_id",
        )?;
        let names = stmt
            .query_map(rusqlite::params![question_id.get(), entity_id.get()], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn get_order_group(&self, entity: &EntityRecord) -> Result<Vec<EntityRecord>, StorageError> {
        let mut sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE tenant_id = ?1 AND entity_type = ?2"
        );
        let mut params: Vec<Value> = vec![
            Value::Integer(entity.tenant_id.get()),
            Value::Text(entity.entity_type.as_str().to_string()),
        ];
        for attr in entity.entity_type.order_groups() {
            params.push(group_value(&entity.group, *attr));
            sql.push_str(&format!(" AND {} IS ?{}", attr.column(), params.len()));
        }
        sql.push_str(" ORDER BY ord, entity_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(params), read_raw_entity)?
            .collect::<Result<Vec<_>, _>>()?;
        raw_to_records(raws)
    }

    fn next_order(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        group: &OrderGroup,
    ) -> Result<i64, StorageError> {
        let mut sql = String::from(
            "SELECT COALESCE(MAX(ord) + 1, 0) FROM entities WHERE tenant_id = ?1 AND entity_type = ?2",
        );
        let mut params: Vec<Value> = vec![
            Value::Integer(tenant_id.get()),
            Value::Text(entity_type.as_str().to_string()),
        ];
        for attr in entity_type.order_groups() {
            params.push(group_value(group, *attr));
            sql.push_str(&format!(" AND {} IS ?{}", attr.column(), params.len()));
        }
        let next = self
            .conn
            .query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))?;
        Ok(next)
    }

    fn max_version(&self, entity_type: EntityType, entity_id: EntityId) -> Result<i64, StorageError> {
        let max = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM versions WHERE entity_id = ?1 AND entity_type = ?2",
            rusqlite::params![entity_id.get(), entity_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn get_versions(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<VersionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, entity_type, version, author, text, deleted, created_at FROM versions
             WHERE entity_id = ?1 AND entity_type = ?2 ORDER BY version",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![entity_id.get(), entity_type.as_str()],
                read_version,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(version_from_tuple).collect()
    }

    fn get_version(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        version: i64,
    ) -> Result<Option<VersionRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_id, entity_type, version, author, text, deleted, created_at FROM versions
                 WHERE entity_id = ?1 AND entity_type = ?2 AND version = ?3",
                rusqlite::params![entity_id.get(), entity_type.as_str(), version],
                read_version,
            )
            .optional()?;
        row.map(version_from_tuple).transpose()
    }

    fn get_draft(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<DraftRecord>, StorageError> {
        let row: Option<(String, Vec<u8>, i64)> = self
            .conn
            .query_row(
                "SELECT author, payload, saved_at FROM drafts WHERE entity_type = ?1 AND entity_id = ?2",
                rusqlite::params![entity_type.as_str(), entity_id.get()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((author, payload_bytes, saved_at)) => Ok(Some(DraftRecord {
                entity_type,
                entity_id,
                author,
                payload: EditPayload::from_msgpack(&payload_bytes)?,
                saved_at,
            })),
            None => Ok(None),
        }
    }

    fn get_audit_entries(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT tenant_id, action, author, created_at FROM audit_log
             WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY audit_id",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![entity_type.as_str(), entity_id.get()],
                |row| {
                    let tenant_id: i64 = row.get(0)?;
                    let action: String = row.get(1)?;
                    let author: String = row.get(2)?;
                    let created_at: i64 = row.get(3)?;
                    Ok((tenant_id, action, author, created_at))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::new();
        for (tenant_id, action, author, created_at) in rows {
            result.push(AuditRecord {
                tenant_id: TenantId::new(tenant_id),
                entity_type,
                entity_id,
                action: AuditAction::parse(&action)?,
                author,
                created_at,
            });
        }
        Ok(result)
    }
}

fn group_value(group: &OrderGroup, attr: scriptdesk_core::GroupAttr) -> Value {
    use scriptdesk_core::GroupAttr;
    match attr {
        GroupAttr::Question => group
            .question_id
            .map_or(Value::Null, |id| Value::Integer(id.get())),
        GroupAttr::Section => group.section_id.map_or(Value::Null, Value::Integer),
        GroupAttr::Applicable => group
            .applicable
            .map_or(Value::Null, |t| Value::Text(t.as_str().to_string())),
    }
}

impl Storage for SqliteStorage {
    fn insert_entity(
        &mut self,
        tenant_id: TenantId,
        entity_type: EntityType,
        payload: &EditPayload,
        temp: bool,
        order: i64,
        now: i64,
    ) -> Result<EntityId, StorageError> {
        self.conn.execute(
            "INSERT INTO entities (tenant_id, entity_type, name, text, temp, ord, question_id, section_id, applicable, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            rusqlite::params![
                tenant_id.get(),
                entity_type.as_str(),
                payload.name,
                payload.text,
                temp,
                order,
                payload.group.question_id.map(|id| id.get()),
                payload.group.section_id,
                payload.group.applicable.map(|t| t.as_str()),
                now,
            ],
        )?;
        let entity_id = EntityId::new(self.conn.last_insert_rowid());
        write_payload_details(&self.conn, entity_id, payload)?;
        Ok(entity_id)
    }

    fn update_entity(
        &mut self,
        entity_id: EntityId,
        payload: &EditPayload,
        temp: bool,
        now: i64,
    ) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE entities SET name = ?1, text = ?2, temp = ?3, question_id = ?4, section_id = ?5, applicable = ?6, updated_at = ?7
             WHERE entity_id = ?8",
            rusqlite::params![
                payload.name,
                payload.text,
                temp,
                payload.group.question_id.map(|id| id.get()),
                payload.group.section_id,
                payload.group.applicable.map(|t| t.as_str()),
                now,
                entity_id.get(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(entity_id.to_string()));
        }
        write_payload_details(&self.conn, entity_id, payload)
    }

    fn update_draft(
        &mut self,
        entity_id: EntityId,
        payload: &EditPayload,
        now: i64,
    ) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "UPDATE entities SET name = ?1, text = ?2, question_id = ?3, section_id = ?4, applicable = ?5, updated_at = ?6
             WHERE entity_id = ?7 AND temp = 1",
            rusqlite::params![
                payload.name,
                payload.text,
                payload.group.question_id.map(|id| id.get()),
                payload.group.section_id,
                payload.group.applicable.map(|t| t.as_str()),
                now,
                entity_id.get(),
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        write_payload_details(&self.conn, entity_id, payload)?;
        Ok(true)
    }

    fn delete_entity(&mut self, entity_id: EntityId) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM entities WHERE entity_id = ?1",
            rusqlite::params![entity_id.get()],
        )?;
        Ok(())
    }

    fn set_order(&mut self, entity_id: EntityId, order: i64) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE entities SET ord = ?1 WHERE entity_id = ?2",
            rusqlite::params![order, entity_id.get()],
        )?;
        Ok(())
    }

    fn insert_edge(
        &mut self,
        edge_type: &str,
        source_id: EntityId,
        target_id: EntityId,
        text: &str,
    ) -> Result<i64, StorageError> {
        let result = self.conn.execute(
            "INSERT INTO edges (edge_type, source_id, target_id, text) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![edge_type, source_id.get(), target_id.get(), text],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if StorageError::is_unique_violation(&e) => Err(
                StorageError::ConstraintViolation(format!(
                    "{edge_type} edge {source_id} -> {target_id}"
                )),
            ),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn save_draft(&mut self, draft: &DraftRecord) -> Result<(), StorageError> {
        let payload_bytes = draft.payload.to_msgpack()?;
        self.conn.execute(
            "INSERT INTO drafts (entity_type, entity_id, author, payload, saved_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(entity_type, entity_id) DO UPDATE SET author = excluded.author, payload = excluded.payload, saved_at = excluded.saved_at",
            rusqlite::params![
                draft.entity_type.as_str(),
                draft.entity_id.get(),
                draft.author,
                payload_bytes,
                draft.saved_at,
            ],
        )?;
        Ok(())
    }

    fn clear_draft(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM drafts WHERE entity_type = ?1 AND entity_id = ?2",
            rusqlite::params![entity_type.as_str(), entity_id.get()],
        )?;
        Ok(())
    }

    fn append_version(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        author: &str,
        text: &str,
        deleted: bool,
        now: i64,
        retry_limit: u32,
    ) -> Result<VersionRecord, StorageError> {
        let mut attempt = 0;
        loop {
            let result = self.conn.query_row(
                "INSERT INTO versions (entity_id, entity_type, version, author, text, deleted, created_at)
                 SELECT ?1, ?2, COALESCE(MAX(version), 0) + 1, ?3, ?4, ?5, ?6
                 FROM versions WHERE entity_id = ?1 AND entity_type = ?2
                 RETURNING version",
                rusqlite::params![entity_id.get(), entity_type.as_str(), author, text, deleted, now],
                |row| row.get::<_, i64>(0),
            );
            match result {
                Ok(version) => {
                    return Ok(VersionRecord {
                        entity_id,
                        entity_type,
                        version,
                        author: author.to_string(),
                        text: text.to_string(),
                        deleted,
                        created_at: now,
                    });
                }
                Err(e) if StorageError::is_unique_violation(&e) && attempt < retry_limit => {
                    attempt += 1;
                    tracing::debug!(
                        entity_type = %entity_type,
                        entity_id = %entity_id,
                        attempt,
                        "version number collision, retrying"
                    );
                }
                Err(e) if StorageError::is_unique_violation(&e) => {
                    return Err(StorageError::VersionCollision {
                        entity_type: entity_type.as_str().to_string(),
                        entity_id: entity_id.get(),
                        version: self.max_version(entity_type, entity_id)? + 1,
                    });
                }
                Err(e) => return Err(StorageError::Sqlite(e)),
            }
        }
    }

    fn insert_audit(&mut self, record: &AuditRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO audit_log (tenant_id, entity_type, entity_id, action, author, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.tenant_id.get(),
                record.entity_type.as_str(),
                record.entity_id.get(),
                record.action.as_str(),
                record.author,
                record.created_at,
            ],
        )?;
        Ok(())
    }
}
