use scriptdesk_core::{Direction, EntityId};
use scriptdesk_storage::{EntityRecord, Storage, StorageError};

/// Keeps sibling `order` values unique while entities are moved one step at
/// a time.
pub struct OrderingService;

impl OrderingService {
    /// Move `entity` one position in `direction` within its ordering group
    /// and return its updated record.
    ///
    /// With a neighbor the two orders are swapped; at the edge of the group
    /// the entity's own order steps past it. Any ties left over from
    /// inconsistent data are then resolved by nudging the other siblings
    /// upward, the moved entity keeping its new value.
    pub fn move_entity<S: Storage>(
        storage: &mut S,
        entity: &EntityRecord,
        direction: Direction,
    ) -> Result<EntityRecord, StorageError> {
        let siblings: Vec<EntityRecord> = storage
            .get_order_group(entity)?
            .into_iter()
            .filter(|s| s.entity_id != entity.entity_id)
            .collect();

        let neighbor = match direction {
            Direction::Up => siblings
                .iter()
                .filter(|s| s.order > entity.order)
                .min_by_key(|s| (s.order, s.entity_id)),
            Direction::Down => siblings
                .iter()
                .filter(|s| s.order < entity.order)
                .max_by_key(|s| (s.order, std::cmp::Reverse(s.entity_id))),
        };

        let mut orders: Vec<(EntityId, i64)> =
            siblings.iter().map(|s| (s.entity_id, s.order)).collect();

        let new_order = match neighbor {
            Some(n) => {
                storage.set_order(n.entity_id, entity.order)?;
                if let Some(slot) = orders.iter_mut().find(|(id, _)| *id == n.entity_id) {
                    slot.1 = entity.order;
                }
                n.order
            }
            None => match direction {
                Direction::Up => entity.order + 1,
                Direction::Down => entity.order - 1,
            },
        };
        storage.set_order(entity.entity_id, new_order)?;

        let neighbor_id = neighbor.map(|n| n.entity_id);
        for (entity_id, order) in resolve_ties(orders, new_order, neighbor_id) {
            tracing::debug!(entity_id = %entity_id, order, "nudging tied sibling");
            storage.set_order(entity_id, order)?;
        }

        tracing::info!(
            entity_type = %entity.entity_type,
            entity_id = %entity.entity_id,
            from = entity.order,
            to = new_order,
            "entity reordered"
        );
        storage
            .get_entity(entity.entity_id)?
            .ok_or_else(|| StorageError::NotFound(entity.entity_id.to_string()))
    }
}

/// New orders for siblings that collide with each other or with `fixed`.
/// Siblings are walked in ascending order and each one that does not sit
/// strictly above its predecessor, or lands on `fixed`, moves up by one.
fn resolve_ties(
    mut orders: Vec<(EntityId, i64)>,
    fixed: i64,
    neighbor: Option<EntityId>,
) -> Vec<(EntityId, i64)> {
    orders.sort_by_key(|(id, order)| (*order, Some(*id) != neighbor, *id));

    let mut changes = Vec::new();
    let mut prev: Option<i64> = None;
    for (entity_id, order) in orders {
        let mut next = order;
        if let Some(p) = prev {
            if next <= p {
                next = p + 1;
            }
        }
        if next == fixed {
            next += 1;
        }
        prev = Some(next);
        if next != order {
            changes.push((entity_id, next));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptdesk_core::{EditPayload, EntityType, TenantId};
    use scriptdesk_storage::{EntityAccess, SqliteStorage};

    fn setup(orders: &[i64]) -> (SqliteStorage, Vec<EntityId>) {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let ids = orders
            .iter()
            .enumerate()
            .map(|(i, order)| {
                storage
                    .insert_entity(
                        TenantId::new(1),
                        EntityType::Trait,
                        &EditPayload::named(format!("t{i}")),
                        false,
                        *order,
                        0,
                    )
                    .unwrap()
            })
            .collect();
        (storage, ids)
    }

    fn orders(storage: &SqliteStorage, ids: &[EntityId]) -> Vec<i64> {
        ids.iter()
            .map(|id| storage.get_entity(*id).unwrap().unwrap().order)
            .collect()
    }

    fn move_id(storage: &mut SqliteStorage, id: EntityId, direction: Direction) -> EntityRecord {
        let entity = storage.get_entity(id).unwrap().unwrap();
        OrderingService::move_entity(storage, &entity, direction).unwrap()
    }

    #[test]
    fn up_swaps_with_next_sibling() {
        let (mut storage, ids) = setup(&[0, 1, 2, 3]);
        let moved = move_id(&mut storage, ids[1], Direction::Up);
        assert_eq!(moved.order, 2);
        assert_eq!(orders(&storage, &ids), vec![0, 2, 1, 3]);
    }

    #[test]
    fn down_swaps_with_previous_sibling() {
        let (mut storage, ids) = setup(&[0, 1, 2, 3]);
        move_id(&mut storage, ids[2], Direction::Down);
        assert_eq!(orders(&storage, &ids), vec![0, 2, 1, 3]);
    }

    #[test]
    fn edges_push_outward() {
        let (mut storage, ids) = setup(&[0, 1]);
        move_id(&mut storage, ids[1], Direction::Up);
        move_id(&mut storage, ids[0], Direction::Down);
        assert_eq!(orders(&storage, &ids), vec![-1, 2]);
    }

    #[test]
    fn sparse_orders_swap_values() {
        let (mut storage, ids) = setup(&[10, 20, 40]);
        move_id(&mut storage, ids[0], Direction::Up);
        assert_eq!(orders(&storage, &ids), vec![20, 10, 40]);
    }

    #[test]
    fn ties_are_nudged_apart() {
        let (mut storage, ids) = setup(&[1, 1, 2, 3]);
        let moved = move_id(&mut storage, ids[0], Direction::Up);
        assert_eq!(moved.order, 2);
        let after = orders(&storage, &ids);
        assert_eq!(after[0], 2);
        let mut sorted = after.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn retry_keeps_orders_unique() {
        let (mut storage, ids) = setup(&[0, 1, 2, 3]);
        for _ in 0..3 {
            move_id(&mut storage, ids[1], Direction::Up);
            let mut after = orders(&storage, &ids);
            after.sort();
            after.dedup();
            assert_eq!(after.len(), 4);
        }
    }

    #[test]
    fn resolve_ties_leaves_unique_orders_alone() {
        let orders = vec![(EntityId::new(1), 0), (EntityId::new(2), 5), (EntityId::new(3), 7)];
        assert!(resolve_ties(orders, 3, None).is_empty());
    }
}
