use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity_type::EntityType;
use crate::error::CoreError;
use crate::ids::{EditorToken, EntityId, TenantId};

/// Cache key holding the lease map of one entity.
pub fn lease_key(tenant_id: TenantId, entity_id: EntityId, entity_type: EntityType) -> String {
    format!("edit-lease:{tenant_id}:{entity_id}:{entity_type}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub display_name: String,
    pub last_heartbeat_ms: u64,
}

/// Somebody seen editing an entity within the lease window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPresence {
    pub tenant_id: TenantId,
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    pub editor_token: EditorToken,
    pub display_name: String,
    pub last_heartbeat_ms: u64,
}

/// Token → presence map stored under a single [`lease_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseMap {
    entries: BTreeMap<EditorToken, PresenceEntry>,
}

impl LeaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &EditorToken) -> Option<&PresenceEntry> {
        self.entries.get(token)
    }

    /// Insert or overwrite the caller's entry with a fresh heartbeat.
    pub fn refresh(&mut self, token: &EditorToken, display_name: &str, now_ms: u64) {
        self.entries.insert(
            token.clone(),
            PresenceEntry {
                display_name: display_name.to_string(),
                last_heartbeat_ms: now_ms,
            },
        );
    }

    /// Drop every entry whose heartbeat is older than `ttl_ms`.
    pub fn prune(&mut self, now_ms: u64, ttl_ms: u64) {
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.last_heartbeat_ms) <= ttl_ms);
    }

    /// Entries that heartbeated within `ttl_ms`.
    pub fn active(
        &self,
        now_ms: u64,
        ttl_ms: u64,
    ) -> impl Iterator<Item = (&EditorToken, &PresenceEntry)> {
        self.entries
            .iter()
            .filter(move |(_, entry)| now_ms.saturating_sub(entry.last_heartbeat_ms) <= ttl_ms)
    }

    /// Active entries other than `token`.
    pub fn others(
        &self,
        token: &EditorToken,
        now_ms: u64,
        ttl_ms: u64,
    ) -> impl Iterator<Item = (&EditorToken, &PresenceEntry)> {
        self.active(now_ms, ttl_ms).filter(move |(t, _)| *t != token)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = lease_key(TenantId::new(4), EntityId::new(7), EntityType::Plot);
        assert_eq!(key, "edit-lease:4:7:plot");
    }

    #[test]
    fn others_skips_caller_and_stale_entries() {
        let a = EditorToken::new("a");
        let b = EditorToken::new("b");
        let c = EditorToken::new("c");
        let mut map = LeaseMap::new();
        map.refresh(&a, "Alice", 10_000);
        map.refresh(&b, "Bruno", 9_000);
        map.refresh(&c, "Carla", 1_000);

        let names: Vec<&str> = map
            .others(&a, 10_000, 5_000)
            .map(|(_, e)| e.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Bruno"]);
    }

    #[test]
    fn prune_keeps_entries_at_exact_ttl() {
        let a = EditorToken::new("a");
        let b = EditorToken::new("b");
        let mut map = LeaseMap::new();
        map.refresh(&a, "Alice", 5_000);
        map.refresh(&b, "Bruno", 4_999);
        map.prune(10_000, 5_000);
        assert_eq!(map.len(), 1);
        assert!(map.get(&a).is_some());
    }

    #[test]
    fn msgpack_preserves_entries() {
        let a = EditorToken::new("a");
        let mut map = LeaseMap::new();
        map.refresh(&a, "Alice", 42);
        let restored = LeaseMap::from_msgpack(&map.to_msgpack().unwrap()).unwrap();
        assert_eq!(restored, map);
    }
}
