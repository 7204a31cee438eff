use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::cache::Tables;
use crate::collaborators::MovementListener;
use crate::geometry::{TilePos, ViewWindow};
use crate::ids::ObjectId;
use crate::records::ObjectRecord;
use crate::store::EntityStore;

/// Ids that changed state during one scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnChanges {
    pub spawned: Vec<ObjectId>,
    pub despawned: Vec<ObjectId>,
}

impl SpawnChanges {
    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty() && self.despawned.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SpawnSchedule {
    last_window: Option<ViewWindow>,
    dirty: bool,
    skipped_scans: u64,
}

impl SpawnSchedule {
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn last_window(&self) -> Option<ViewWindow> {
        self.last_window
    }

    pub(crate) fn skipped_scans(&self) -> u64 {
        self.skipped_scans
    }

    pub(crate) fn reset(&mut self) {
        self.last_window = None;
        self.dirty = true;
    }

    /// Evaluates every scheduled record against `window`. The tables are
    /// only borrowed mutably when at least one record changes state.
    pub(crate) fn run(
        &mut self,
        store: &mut EntityStore,
        window: ViewWindow,
        movement: &mut dyn MovementListener,
    ) -> SpawnChanges {
        if !self.dirty && self.last_window == Some(window) {
            self.skipped_scans += 1;
            return SpawnChanges::default();
        }

        let plan = SpawnPlan::build(store.tables(), window);
        self.last_window = Some(window);
        self.dirty = false;
        if plan.is_empty() {
            return SpawnChanges::default();
        }

        let tables = store.tables_mut();
        let mut changes = SpawnChanges::default();
        for id in plan.npcs.despawn {
            movement.remove_entity(&id);
            debug!(npc_id = %id, "npc_despawned_offscreen");
            tables.offscreen.npcs.insert(id.clone());
            changes.despawned.push(id);
        }
        for id in plan.npcs.spawn {
            if let Some(npc) = tables.npcs.get_mut(&id) {
                npc.reset_to_template();
            }
            movement.remove_entity(&id);
            debug!(npc_id = %id, "npc_respawned");
            tables.offscreen.npcs.remove(&id);
            changes.spawned.push(id);
        }
        plan.items.apply(&mut tables.offscreen.items, &mut changes);
        plan.script_objects
            .apply(&mut tables.offscreen.script_objects, &mut changes);
        plan.large_objects
            .apply(&mut tables.offscreen.large_objects, &mut changes);
        changes
    }
}

#[derive(Debug, Default)]
struct Transitions {
    spawn: Vec<ObjectId>,
    despawn: Vec<ObjectId>,
}

impl Transitions {
    fn is_empty(&self) -> bool {
        self.spawn.is_empty() && self.despawn.is_empty()
    }

    fn apply(self, offscreen: &mut BTreeSet<ObjectId>, changes: &mut SpawnChanges) {
        for id in self.despawn {
            offscreen.insert(id.clone());
            changes.despawned.push(id);
        }
        for id in self.spawn {
            offscreen.remove(&id);
            changes.spawned.push(id);
        }
    }
}

#[derive(Debug, Default)]
struct SpawnPlan {
    npcs: Transitions,
    items: Transitions,
    script_objects: Transitions,
    large_objects: Transitions,
}

impl SpawnPlan {
    fn build(tables: &Tables, window: ViewWindow) -> Self {
        Self {
            // A wandering NPC stays resident while its spawn tile is in view.
            npcs: scan(&tables.npcs, &tables.offscreen.npcs, |npc| {
                let outside = !window.contains(npc.tile) && !window.contains(npc.initial_tile);
                (outside, window.contains(npc.initial_tile))
            }),
            items: scan(&tables.items, &tables.offscreen.items, |item| {
                single_tile(window, item.tile, item.tile)
            }),
            script_objects: scan(
                &tables.script_objects,
                &tables.offscreen.script_objects,
                |object| single_tile(window, object.tile, object.initial_tile),
            ),
            large_objects: scan(
                &tables.large_objects,
                &tables.offscreen.large_objects,
                |object| single_tile(window, object.tile, object.initial_tile),
            ),
        }
    }

    fn is_empty(&self) -> bool {
        self.npcs.is_empty()
            && self.items.is_empty()
            && self.script_objects.is_empty()
            && self.large_objects.is_empty()
    }
}

fn single_tile(window: ViewWindow, tile: TilePos, spawn_tile: TilePos) -> (bool, bool) {
    (!window.contains(tile), window.contains(spawn_tile))
}

/// `classify` returns `(should_despawn, spawn_tile_in_view)`.
fn scan<T: ObjectRecord>(
    table: &BTreeMap<ObjectId, T>,
    offscreen: &BTreeSet<ObjectId>,
    classify: impl Fn(&T) -> (bool, bool),
) -> Transitions {
    let mut transitions = Transitions::default();
    for (id, record) in table {
        if !record.shown() {
            continue;
        }
        let (should_despawn, spawn_in_view) = classify(record);
        if offscreen.contains(id) {
            if spawn_in_view {
                transitions.spawn.push(id.clone());
            }
        } else if should_despawn {
            transitions.despawn.push(id.clone());
        }
    }
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemoryFlagStore, NoMovementEngine};
    use crate::geometry::TileOffset;
    use crate::ids::MapId;
    use crate::raw::{MapInstance, RawObjectEvent};

    fn window(top: i32) -> ViewWindow {
        ViewWindow {
            left: 0,
            right: 20,
            top,
            bottom: top + 10,
        }
    }

    fn store_with_npc_at(x: i32, y: i32) -> (EntityStore, ObjectId) {
        let mut store = EntityStore::default();
        let map = MapInstance::new("MAP_OLDALE_TOWN", TileOffset::default()).with_object_events(
            vec![RawObjectEvent {
                graphics_id: "OBJ_EVENT_GFX_GIRL_1".to_string(),
                x,
                y,
                ..RawObjectEvent::default()
            }],
        );
        store
            .populate(&map, &MemoryFlagStore::new())
            .expect("populated");
        let id = store
            .find_npc_id(&MapId::new("MAP_OLDALE_TOWN"), "1")
            .expect("npc");
        (store, id)
    }

    #[test]
    fn unchanged_window_skips_the_scan() {
        let (mut store, _) = store_with_npc_at(5, 2);
        let mut schedule = SpawnSchedule::default();
        schedule.run(&mut store, window(0), &mut NoMovementEngine);
        let version = store.version();

        let changes = schedule.run(&mut store, window(0), &mut NoMovementEngine);
        assert!(changes.is_empty());
        assert_eq!(schedule.skipped_scans(), 1);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn scan_without_transitions_keeps_the_version() {
        let (mut store, _) = store_with_npc_at(5, 2);
        let mut schedule = SpawnSchedule::default();
        let version = store.version();
        let changes = schedule.run(&mut store, window(1), &mut NoMovementEngine);
        assert!(changes.is_empty());
        assert_eq!(store.version(), version);
        assert_eq!(schedule.last_window(), Some(window(1)));
    }

    #[test]
    fn despawn_and_respawn_follow_the_window() {
        let (mut store, id) = store_with_npc_at(5, 2);
        let mut schedule = SpawnSchedule::default();

        let changes = schedule.run(&mut store, window(3), &mut NoMovementEngine);
        assert_eq!(changes.despawned, vec![id.clone()]);
        assert!(store.tables().offscreen.npcs.contains(&id));

        let changes = schedule.run(&mut store, window(0), &mut NoMovementEngine);
        assert_eq!(changes.spawned, vec![id.clone()]);
        assert!(store.tables().offscreen.npcs.is_empty());
    }

    #[test]
    fn dirty_schedule_rescans_same_window() {
        let (mut store, id) = store_with_npc_at(5, 2);
        let mut schedule = SpawnSchedule::default();
        schedule.run(&mut store, window(0), &mut NoMovementEngine);

        store.tables_mut().npcs.get_mut(&id).expect("npc").tile = TilePos::new(5, 40);
        store.tables_mut().npcs.get_mut(&id).expect("npc").initial_tile = TilePos::new(5, 40);
        assert!(schedule
            .run(&mut store, window(0), &mut NoMovementEngine)
            .is_empty());

        schedule.mark_dirty();
        let changes = schedule.run(&mut store, window(0), &mut NoMovementEngine);
        assert_eq!(changes.despawned, vec![id]);
    }
}
