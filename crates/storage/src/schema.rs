use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS entities (
    entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL DEFAULT '',
    temp INTEGER NOT NULL DEFAULT 0 CHECK (temp IN (0, 1)),
    ord INTEGER NOT NULL DEFAULT 0,
    question_id INTEGER,
    section_id INTEGER,
    applicable TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_tenant_type ON entities (tenant_id, entity_type, ord);

CREATE TABLE IF NOT EXISTS fields (
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (entity_id, field_key)
);

CREATE TABLE IF NOT EXISTS edges (
    edge_id INTEGER PRIMARY KEY AUTOINCREMENT,
    edge_type TEXT NOT NULL,
    source_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    text TEXT NOT NULL DEFAULT '',
    UNIQUE (edge_type, source_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges (source_id, edge_type);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (target_id, edge_type);

CREATE TABLE IF NOT EXISTS answers (
    question_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    PRIMARY KEY (question_id, entity_id)
);

CREATE TABLE IF NOT EXISTS choices (
    question_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    option_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    PRIMARY KEY (question_id, entity_id, option_id)
);

CREATE TABLE IF NOT EXISTS drafts (
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL REFERENCES entities (entity_id) ON DELETE CASCADE,
    author TEXT NOT NULL,
    payload BLOB NOT NULL,
    saved_at INTEGER NOT NULL,
    PRIMARY KEY (entity_type, entity_id)
);

-- Version history outlives the entity row, so no foreign key here.
CREATE TABLE IF NOT EXISTS versions (
    entity_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    author TEXT NOT NULL,
    text TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1)),
    created_at INTEGER NOT NULL,
    PRIMARY KEY (entity_id, entity_type, version)
);

CREATE TABLE IF NOT EXISTS audit_log (
    audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('NEW', 'UPDATE', 'DELETE')),
    author TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log (entity_type, entity_id);
";

pub fn init_lease_cache_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 5000;
        CREATE TABLE IF NOT EXISTS lease_cache (
            cache_key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            expires_at INTEGER NOT NULL
        );
    ",
    )?;
    Ok(())
}
