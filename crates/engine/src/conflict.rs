//! Advisory conflict detection over TTL leases.
//!
//! Every check also registers the caller, so the lease map for an entity is
//! the set of sessions that checked it within the last TTL window. Nothing
//! here blocks an edit: the result is a warning or nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scriptdesk_core::{
    Caller, Clock, EditorPresence, EditorToken, EntityId, EntityType, LeaseCache, LeaseMap,
    TenantId, lease_key,
};
use scriptdesk_storage::{
    EDGE_FACTION_MEMBER, EDGE_PLOT_CHARACTER, EntityAccess, StorageError,
};

use crate::messages::Locale;

/// Resolves a composite entity to the related entities whose editors it
/// conflicts with.
pub type ChildResolver =
    fn(&dyn EntityAccess, EntityId) -> Result<Vec<(EntityType, EntityId)>, StorageError>;

/// Map from entity type to its child resolver. Types without an entry are
/// leaves.
#[derive(Clone, Default)]
pub struct CompositeRegistry {
    resolvers: HashMap<EntityType, ChildResolver>,
}

impl CompositeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plots expand to their attached characters, factions to their members.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EntityType::Plot, plot_characters);
        registry.register(EntityType::Faction, faction_members);
        registry
    }

    pub fn register(&mut self, entity_type: EntityType, resolver: ChildResolver) {
        self.resolvers.insert(entity_type, resolver);
    }

    pub fn is_composite(&self, entity_type: EntityType) -> bool {
        self.resolvers.contains_key(&entity_type)
    }

    pub fn children(
        &self,
        storage: &dyn EntityAccess,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Vec<(EntityType, EntityId)>, StorageError> {
        match self.resolvers.get(&entity_type) {
            Some(resolve) => resolve(storage, entity_id),
            None => Ok(Vec::new()),
        }
    }
}

fn plot_characters(
    storage: &dyn EntityAccess,
    plot_id: EntityId,
) -> Result<Vec<(EntityType, EntityId)>, StorageError> {
    Ok(storage
        .get_edges_from(plot_id, EDGE_PLOT_CHARACTER)?
        .into_iter()
        .map(|edge| (EntityType::Character, edge.target_id))
        .collect())
}

fn faction_members(
    storage: &dyn EntityAccess,
    faction_id: EntityId,
) -> Result<Vec<(EntityType, EntityId)>, StorageError> {
    Ok(storage
        .get_edges_from(faction_id, EDGE_FACTION_MEMBER)?
        .into_iter()
        .map(|edge| (EntityType::Character, edge.target_id))
        .collect())
}

pub struct ConflictChecker {
    cache: Arc<dyn LeaseCache>,
    clock: Arc<dyn Clock>,
    registry: CompositeRegistry,
    lease_ttl: Duration,
    cache_ttl: Duration,
    locale: Locale,
}

impl ConflictChecker {
    pub fn new(
        cache: Arc<dyn LeaseCache>,
        clock: Arc<dyn Clock>,
        lease_ttl: Duration,
        cache_ttl: Duration,
        locale: Locale,
    ) -> Self {
        Self {
            cache,
            clock,
            registry: CompositeRegistry::with_defaults(),
            lease_ttl,
            cache_ttl,
            locale,
        }
    }

    pub fn with_registry(mut self, registry: CompositeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Editors currently holding a lease on the entity, without registering
    /// anyone. An unreachable cache reads as nobody.
    pub fn active_editors(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Vec<EditorPresence> {
        let key = lease_key(tenant_id, entity_id, entity_type);
        let now = self.clock.now_ms();
        let ttl_ms = u64::try_from(self.lease_ttl.as_millis()).unwrap_or(u64::MAX);
        let map = match self.cache.get(&key) {
            Ok(Some(bytes)) => match LeaseMap::from_msgpack(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(key = %key, "unreadable lease map: {e}");
                    return Vec::new();
                }
            },
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %key, "lease cache unavailable: {e}");
                return Vec::new();
            }
        };
        map.active(now, ttl_ms)
            .map(|(token, entry)| EditorPresence {
                tenant_id,
                entity_id,
                entity_type,
                editor_token: token.clone(),
                display_name: entry.display_name.clone(),
                last_heartbeat_ms: entry.last_heartbeat_ms,
            })
            .collect()
    }

    /// Register the caller as editing the entity and report other recent
    /// editors of it or, for composites, of any of its children.
    ///
    /// Never fails. Cache or lookup errors are logged and read as "no
    /// conflict". Privileged callers and callers without a token are not
    /// checked and not registered.
    pub fn check_and_register(
        &self,
        storage: &dyn EntityAccess,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
        token: Option<&EditorToken>,
    ) -> Option<String> {
        if caller.privileged {
            return None;
        }
        let token = token.filter(|t| !t.is_empty())?;

        let mut warning = self.check_leaf(caller, entity_type, entity_id, token);

        let children = match self.registry.children(storage, entity_type, entity_id) {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!(
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    "composite expansion failed, checking entity alone: {e}"
                );
                Vec::new()
            }
        };
        for (child_type, child_id) in children {
            let child_warning = self.check_leaf(caller, child_type, child_id, token);
            if warning.is_none() {
                warning = child_warning;
            }
        }

        if warning.is_some() {
            tracing::info!(
                tenant = %caller.tenant_id,
                entity_type = %entity_type,
                entity_id = %entity_id,
                editor = %caller.display_name,
                "concurrent editors detected"
            );
        }
        warning
    }

    fn check_leaf(
        &self,
        caller: &Caller,
        entity_type: EntityType,
        entity_id: EntityId,
        token: &EditorToken,
    ) -> Option<String> {
        let key = lease_key(caller.tenant_id, entity_id, entity_type);
        let now = self.clock.now_ms();
        let ttl_ms = u64::try_from(self.lease_ttl.as_millis()).unwrap_or(u64::MAX);

        let mut map = match self.cache.get(&key) {
            Ok(Some(bytes)) => LeaseMap::from_msgpack(&bytes).unwrap_or_else(|e| {
                tracing::warn!(key = %key, "discarding unreadable lease map: {e}");
                LeaseMap::new()
            }),
            Ok(None) => LeaseMap::new(),
            Err(e) => {
                // Writing back a map built from nothing would erase other
                // editors once the cache recovers.
                tracing::warn!(key = %key, "lease cache unavailable, skipping conflict check: {e}");
                return None;
            }
        };

        map.prune(now, ttl_ms);
        let others: Vec<String> = map
            .others(token, now, ttl_ms)
            .map(|(_, entry)| entry.display_name.clone())
            .collect();
        map.refresh(token, &caller.display_name, now);
        tracing::debug!(key = %key, editors = map.len(), "lease refreshed");

        match map.to_msgpack() {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&key, &bytes, self.cache_ttl) {
                    tracing::warn!(key = %key, "failed to store lease: {e}");
                }
            }
            Err(e) => tracing::warn!(key = %key, "failed to encode lease map: {e}"),
        }

        if others.is_empty() {
            None
        } else {
            Some(self.locale.conflict_warning(&others))
        }
    }
}
