//! Flag-driven visibility passes. Each runs at a different lifecycle point
//! and treats transient script overrides differently.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::collaborators::{FlagStore, MovementListener};
use crate::geometry::{TilePos, ViewWindow};
use crate::ids::{MapId, ObjectId};
use crate::store::EntityStore;

fn pending<T>(table: &BTreeMap<ObjectId, T>, stale: impl Fn(&T) -> bool) -> Vec<ObjectId> {
    table
        .iter()
        .filter(|(_, record)| stale(record))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Cold load or save import: every flag-driven field is recomputed and
/// transient overrides are dropped.
pub(crate) fn reconcile_all(store: &mut EntityStore, flags: &dyn FlagStore) -> usize {
    let tables = store.tables();
    let npcs = pending(&tables.npcs, |npc| {
        npc.script_removed || npc.visible == npc.flag.is_raised(flags)
    });
    let script_objects = pending(&tables.script_objects, |object| {
        object.script_removed || object.visible == object.flag.is_raised(flags)
    });
    let large_objects = pending(&tables.large_objects, |object| {
        object.visible == object.flag.is_raised(flags)
    });
    let items = pending(&tables.items, |item| item.collected != item.flag.is_raised(flags));
    let bg_events = pending(&tables.bg_events, |event| {
        event.collected != event.flag.is_raised(flags)
    });
    let changed =
        npcs.len() + script_objects.len() + large_objects.len() + items.len() + bg_events.len();

    if changed > 0 {
        let tables = store.tables_mut();
        for id in npcs {
            if let Some(npc) = tables.npcs.get_mut(&id) {
                npc.visible = !npc.flag.is_raised(flags);
                npc.script_removed = false;
            }
        }
        for id in script_objects {
            if let Some(object) = tables.script_objects.get_mut(&id) {
                object.visible = !object.flag.is_raised(flags);
                object.script_removed = false;
            }
        }
        for id in large_objects {
            if let Some(object) = tables.large_objects.get_mut(&id) {
                object.visible = !object.flag.is_raised(flags);
            }
        }
        for id in items {
            if let Some(item) = tables.items.get_mut(&id) {
                item.collected = item.flag.is_raised(flags);
            }
        }
        for id in bg_events {
            if let Some(event) = tables.bg_events.get_mut(&id) {
                event.collected = event.flag.is_raised(flags);
            }
        }
    }
    info!(changed, "object_flags_reconciled");
    changed
}

/// Camera re-entered a resident map. Records with an active script override
/// keep their state.
pub(crate) fn reconcile_map_entry(
    store: &mut EntityStore,
    map_id: &MapId,
    flags: &dyn FlagStore,
) -> usize {
    let tables = store.tables();
    let overridden = tables
        .npcs
        .values()
        .filter(|npc| &npc.map_id == map_id && npc.script_removed)
        .count()
        + tables
            .script_objects
            .values()
            .filter(|object| &object.map_id == map_id && object.script_removed)
            .count();
    let npcs = pending(&tables.npcs, |npc| {
        &npc.map_id == map_id && !npc.script_removed && npc.visible == npc.flag.is_raised(flags)
    });
    let script_objects = pending(&tables.script_objects, |object| {
        &object.map_id == map_id
            && !object.script_removed
            && object.visible == object.flag.is_raised(flags)
    });
    let large_objects = pending(&tables.large_objects, |object| {
        &object.map_id == map_id && object.visible == object.flag.is_raised(flags)
    });
    let items = pending(&tables.items, |item| {
        &item.map_id == map_id && item.collected != item.flag.is_raised(flags)
    });
    let bg_events = pending(&tables.bg_events, |event| {
        &event.map_id == map_id && event.collected != event.flag.is_raised(flags)
    });
    let changed =
        npcs.len() + script_objects.len() + large_objects.len() + items.len() + bg_events.len();

    if changed > 0 {
        let tables = store.tables_mut();
        for id in npcs {
            if let Some(npc) = tables.npcs.get_mut(&id) {
                npc.visible = !npc.flag.is_raised(flags);
            }
        }
        for id in script_objects {
            if let Some(object) = tables.script_objects.get_mut(&id) {
                object.visible = !object.flag.is_raised(flags);
            }
        }
        for id in large_objects {
            if let Some(object) = tables.large_objects.get_mut(&id) {
                object.visible = !object.flag.is_raised(flags);
            }
        }
        for id in items {
            if let Some(item) = tables.items.get_mut(&id) {
                item.collected = item.flag.is_raised(flags);
            }
        }
        for id in bg_events {
            if let Some(event) = tables.bg_events.get_mut(&id) {
                event.collected = event.flag.is_raised(flags);
            }
        }
    }
    debug!(map_id = %map_id, changed, overridden, "map_entry_flags_reconciled");
    changed
}

/// After a script finishes: records whose hide flag was cleared come back.
/// Those whose spawn tile is inside the last window respawn immediately; the
/// rest are parked offscreen for the scheduler.
pub(crate) fn respawn_flag_cleared(
    store: &mut EntityStore,
    flags: &dyn FlagStore,
    last_window: Option<ViewWindow>,
    movement: &mut dyn MovementListener,
) -> usize {
    let in_view = |tile: TilePos| last_window.map_or(true, |window| window.contains(tile));
    let tables = store.tables();
    let npcs = pending(&tables.npcs, |npc| {
        !npc.script_removed && !npc.visible && !npc.flag.is_raised(flags)
    });
    let script_objects = pending(&tables.script_objects, |object| {
        !object.script_removed && !object.visible && !object.flag.is_raised(flags)
    });
    let large_objects = pending(&tables.large_objects, |object| {
        !object.visible && !object.flag.is_raised(flags)
    });
    let changed = npcs.len() + script_objects.len() + large_objects.len();
    if changed == 0 {
        return 0;
    }

    let tables = store.tables_mut();
    for id in npcs {
        let Some(npc) = tables.npcs.get_mut(&id) else {
            continue;
        };
        npc.visible = true;
        if in_view(npc.initial_tile) {
            npc.reset_to_template();
            movement.remove_entity(&id);
            tables.offscreen.npcs.remove(&id);
            debug!(npc_id = %id, "npc_restored_after_script");
        } else {
            tables.offscreen.npcs.insert(id);
        }
    }
    for id in script_objects {
        let Some(object) = tables.script_objects.get_mut(&id) else {
            continue;
        };
        object.visible = true;
        if in_view(object.initial_tile) {
            object.tile = object.initial_tile;
            tables.offscreen.script_objects.remove(&id);
        } else {
            tables.offscreen.script_objects.insert(id);
        }
    }
    for id in large_objects {
        let Some(object) = tables.large_objects.get_mut(&id) else {
            continue;
        };
        object.visible = true;
        if in_view(object.initial_tile) {
            tables.offscreen.large_objects.remove(&id);
        } else {
            tables.offscreen.large_objects.insert(id);
        }
    }
    changed
}

pub(crate) fn refresh_collected_state(store: &mut EntityStore, flags: &dyn FlagStore) -> usize {
    let tables = store.tables();
    let items = pending(&tables.items, |item| item.collected != item.flag.is_raised(flags));
    let bg_events = pending(&tables.bg_events, |event| {
        event.collected != event.flag.is_raised(flags)
    });
    let changed = items.len() + bg_events.len();
    if changed == 0 {
        return 0;
    }
    let tables = store.tables_mut();
    for id in items {
        if let Some(item) = tables.items.get_mut(&id) {
            item.collected = item.flag.is_raised(flags);
        }
    }
    for id in bg_events {
        if let Some(event) = tables.bg_events.get_mut(&id) {
            event.collected = event.flag.is_raised(flags);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryFlagStore, NoMovementEngine};
    use crate::geometry::TileOffset;
    use crate::raw::{MapInstance, RawBgEvent, RawObjectEvent};

    const HIDE_RIVAL: &str = "FLAG_HIDE_RIVAL";

    fn store(flags: &MemoryFlagStore) -> (EntityStore, ObjectId) {
        let mut store = EntityStore::default();
        let map = MapInstance::new("MAP_ROUTE103", TileOffset::default()).with_object_events(
            vec![RawObjectEvent {
                local_id: Some("LOCALID_RIVAL".to_string()),
                graphics_id: "OBJ_EVENT_GFX_MAY_NORMAL".to_string(),
                x: 4,
                y: 4,
                flag: HIDE_RIVAL.to_string(),
                ..RawObjectEvent::default()
            }],
        );
        store.populate(&map, flags).expect("populated");
        let id = store
            .find_npc_id(&MapId::new("MAP_ROUTE103"), "LOCALID_RIVAL")
            .expect("rival");
        (store, id)
    }

    #[test]
    fn full_reconcile_clears_script_overrides() {
        let flags = MemoryFlagStore::new();
        let (mut store, id) = store(&flags);
        {
            let npc = store.tables_mut().npcs.get_mut(&id).expect("npc");
            npc.visible = false;
            npc.script_removed = true;
        }
        assert_eq!(reconcile_all(&mut store, &flags), 1);
        let npc = &store.tables().npcs[&id];
        assert!(npc.visible);
        assert!(!npc.script_removed);
    }

    #[test]
    fn map_entry_reconcile_respects_script_overrides() {
        let flags = MemoryFlagStore::new();
        let (mut store, id) = store(&flags);
        {
            let npc = store.tables_mut().npcs.get_mut(&id).expect("npc");
            npc.visible = false;
            npc.script_removed = true;
        }
        let map = MapId::new("MAP_ROUTE103");
        assert_eq!(reconcile_map_entry(&mut store, &map, &flags), 0);
        assert!(!store.tables().npcs[&id].visible);

        store.tables_mut().npcs.get_mut(&id).expect("npc").script_removed = false;
        assert_eq!(reconcile_map_entry(&mut store, &map, &flags), 1);
        assert!(store.tables().npcs[&id].visible);
    }

    #[test]
    fn map_entry_reconcile_refreshes_hidden_items() {
        let mut flags = MemoryFlagStore::new();
        let mut store = EntityStore::default();
        let map_id = MapId::new("MAP_ROUTE104");
        let map = MapInstance::new("MAP_ROUTE104", TileOffset::default()).with_bg_events(vec![
            RawBgEvent {
                kind: "hidden_item".to_string(),
                x: 7,
                y: 7,
                item: "ITEM_HEART_SCALE".to_string(),
                flag: "FLAG_HIDDEN_ITEM_ROUTE_104_HEART_SCALE".to_string(),
                ..RawBgEvent::default()
            },
        ]);
        store.populate(&map, &flags).expect("populated");
        let collected = |store: &EntityStore| {
            store
                .tables()
                .bg_events
                .values()
                .next()
                .map(|event| event.collected)
        };
        assert_eq!(collected(&store), Some(false));

        flags.set("FLAG_HIDDEN_ITEM_ROUTE_104_HEART_SCALE");
        assert_eq!(reconcile_map_entry(&mut store, &map_id, &flags), 1);
        assert_eq!(collected(&store), Some(true));
        assert_eq!(reconcile_map_entry(&mut store, &map_id, &flags), 0);
    }

    #[test]
    fn cleared_flag_outside_window_parks_offscreen() {
        let mut flags = MemoryFlagStore::with_flags([HIDE_RIVAL]);
        let (mut store, id) = store(&flags);
        assert!(!store.tables().npcs[&id].visible);
        flags.clear(HIDE_RIVAL);

        let far = ViewWindow {
            left: 50,
            right: 60,
            top: 50,
            bottom: 60,
        };
        assert_eq!(
            respawn_flag_cleared(&mut store, &flags, Some(far), &mut NoMovementEngine),
            1
        );
        assert!(store.tables().npcs[&id].visible);
        assert!(store.tables().offscreen.npcs.contains(&id));
    }

    #[test]
    fn cleared_flag_inside_window_respawns_at_template() {
        let mut flags = MemoryFlagStore::with_flags([HIDE_RIVAL]);
        let (mut store, id) = store(&flags);
        store.tables_mut().npcs.get_mut(&id).expect("npc").tile = TilePos::new(7, 7);
        flags.clear(HIDE_RIVAL);

        let near = ViewWindow {
            left: 0,
            right: 10,
            top: 0,
            bottom: 10,
        };
        respawn_flag_cleared(&mut store, &flags, Some(near), &mut NoMovementEngine);
        let npc = &store.tables().npcs[&id];
        assert!(npc.visible);
        assert_eq!(npc.tile, TilePos::new(4, 4));
        assert!(store.tables().offscreen.npcs.is_empty());
    }
}
