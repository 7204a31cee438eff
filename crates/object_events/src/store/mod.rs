mod revealed;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::cache::{Tables, Tracked};
use crate::classify::{classify, GraphicsClass};
use crate::collaborators::FlagStore;
use crate::geometry::TileOffset;
use crate::ids::{LocalId, MapId, ObjectCategory, ObjectId};
use crate::raw::MapInstance;
use crate::records::{BgEvent, ItemBall, LargeObject, NpcObject, ObjectRecord, ScriptObject};

pub(crate) use revealed::RevealedDisguiseStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub npcs: usize,
    pub items: usize,
    pub script_objects: usize,
    pub large_objects: usize,
    pub bg_events: usize,
    pub skipped: usize,
    pub restored_reveals: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MapPlacement {
    offset: TileOffset,
    variant: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct EntityStore {
    tables: Tracked<Tables>,
    maps: BTreeMap<MapId, MapPlacement>,
    known_maps: BTreeSet<MapId>,
    revealed: RevealedDisguiseStore,
}

impl EntityStore {
    pub(crate) fn tables(&self) -> &Tracked<Tables> {
        &self.tables
    }

    /// Mutable access to the tables. Invalidates every cached view.
    pub(crate) fn tables_mut(&mut self) -> &mut Tables {
        self.tables.get_mut()
    }

    pub(crate) fn version(&self) -> u64 {
        self.tables.version()
    }

    /// Motion-only access to one NPC. Does not invalidate cached views.
    pub(crate) fn npc_motion_mut(&mut self, id: &ObjectId) -> Option<&mut NpcObject> {
        self.tables.get_mut_unversioned().npcs.get_mut(id)
    }

    pub(crate) fn map_offset(&self, map_id: &MapId) -> Option<TileOffset> {
        self.maps.get(map_id).map(|placement| placement.offset)
    }

    pub(crate) fn has_map(&self, map_id: &MapId) -> bool {
        self.maps.contains_key(map_id)
    }

    pub(crate) fn map_ids(&self) -> impl Iterator<Item = &MapId> {
        self.maps.keys()
    }

    pub(crate) fn revealed_count(&self) -> usize {
        self.revealed.len()
    }

    /// Classifies and stores every descriptor of `map`. Returns `None` when
    /// the map is already resident.
    pub(crate) fn populate(
        &mut self,
        map: &MapInstance,
        flags: &dyn FlagStore,
    ) -> Option<PopulateSummary> {
        if self.maps.contains_key(&map.id) {
            debug!(map_id = %map.id, "map_objects_already_populated");
            return None;
        }
        let offset = map.offset();
        let variant = map.variant.as_deref();
        let mut summary = PopulateSummary::default();
        let tables = self.tables.get_mut();

        for (position, raw) in map.object_events.iter().enumerate() {
            let local_id = LocalId {
                name: raw.local_id.clone(),
                index: u16::try_from(position + 1).unwrap_or(u16::MAX),
            };
            match classify(raw) {
                GraphicsClass::DecorationPlaceholder => summary.skipped += 1,
                GraphicsClass::AddressableLargeObject | GraphicsClass::Npc => {
                    let mut npc = NpcObject::from_raw(&map.id, local_id, raw, offset);
                    npc.visible = !npc.flag.is_raised(flags);
                    if self.revealed.restore(&mut npc, offset, variant) {
                        debug!(npc_id = %npc.id, "revealed_disguise_restored");
                        summary.restored_reveals += 1;
                    }
                    if insert_unique(&mut tables.npcs, npc) {
                        summary.npcs += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                GraphicsClass::LargeObject => {
                    let mut object = LargeObject::from_raw(&map.id, raw, offset);
                    object.visible = !object.flag.is_raised(flags);
                    if insert_unique(&mut tables.large_objects, object) {
                        summary.large_objects += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                GraphicsClass::ItemBall => {
                    let mut item = ItemBall::from_raw(&map.id, raw, offset);
                    item.collected = item.flag.is_raised(flags);
                    if insert_unique(&mut tables.items, item) {
                        summary.items += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                GraphicsClass::ScriptObject => {
                    let Some(mut object) = ScriptObject::from_raw(&map.id, local_id, raw, offset)
                    else {
                        summary.skipped += 1;
                        continue;
                    };
                    object.visible = !object.flag.is_raised(flags);
                    if insert_unique(&mut tables.script_objects, object) {
                        summary.script_objects += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                GraphicsClass::Ignored => {
                    let graphics = raw.graphics_id.trim();
                    if !graphics.is_empty() && !graphics.starts_with("OBJ_EVENT_GFX_") {
                        warn!(
                            map_id = %map.id,
                            graphics_id = graphics,
                            local_id = %local_id,
                            "unknown_object_graphics_ignored"
                        );
                    }
                    summary.skipped += 1;
                }
            }
        }

        for raw in &map.bg_events {
            let Some(mut event) = BgEvent::from_raw(&map.id, raw, offset) else {
                warn!(map_id = %map.id, kind = raw.kind.as_str(), "unknown_bg_event_ignored");
                summary.skipped += 1;
                continue;
            };
            event.collected = event.flag.is_raised(flags);
            if insert_unique(&mut tables.bg_events, event) {
                summary.bg_events += 1;
            } else {
                summary.skipped += 1;
            }
        }

        self.maps.insert(
            map.id.clone(),
            MapPlacement {
                offset,
                variant: map.variant.clone(),
            },
        );
        self.known_maps.insert(map.id.clone());
        info!(
            map_id = %map.id,
            npc_count = summary.npcs,
            item_count = summary.items,
            script_object_count = summary.script_objects,
            large_object_count = summary.large_objects,
            bg_event_count = summary.bg_events,
            skipped = summary.skipped,
            "map_objects_populated"
        );
        Some(summary)
    }

    /// Drops every record of `map_id`, first capturing revealed disguises.
    /// Returns the number of removed records.
    pub(crate) fn remove(&mut self, map_id: &MapId) -> Option<usize> {
        let Some(placement) = self.maps.remove(map_id) else {
            self.report_unknown_map(map_id, "remove");
            return None;
        };
        for npc in self.tables.npcs.values().filter(|npc| &npc.map_id == map_id) {
            self.revealed
                .capture(npc, placement.offset, placement.variant.as_deref());
        }
        let removed = self.tables.get_mut().retain_other_maps(map_id);
        info!(map_id = %map_id, removed, "map_objects_removed");
        Some(removed)
    }

    pub(crate) fn reposition(&mut self, map_id: &MapId, delta: TileOffset) -> bool {
        let Some(placement) = self.maps.get_mut(map_id) else {
            self.report_unknown_map(map_id, "reposition");
            return false;
        };
        placement.offset =
            TileOffset::new(placement.offset.x + delta.x, placement.offset.y + delta.y);
        let new_offset = placement.offset;
        let tables = self.tables.get_mut();
        shift_map(&mut tables.npcs, map_id, delta);
        shift_map(&mut tables.items, map_id, delta);
        shift_map(&mut tables.script_objects, map_id, delta);
        shift_map(&mut tables.large_objects, map_id, delta);
        shift_map(&mut tables.bg_events, map_id, delta);
        info!(
            map_id = %map_id,
            dx = delta.x,
            dy = delta.y,
            offset_x = new_offset.x,
            offset_y = new_offset.y,
            "map_objects_repositioned"
        );
        true
    }

    /// Drops every table and map placement. Revealed disguises are captured
    /// first and kept.
    pub(crate) fn clear(&mut self) {
        for npc in self.tables.npcs.values() {
            if let Some(placement) = self.maps.get(&npc.map_id) {
                self.revealed
                    .capture(npc, placement.offset, placement.variant.as_deref());
            }
        }
        *self.tables.get_mut() = Tables::default();
        self.maps.clear();
        self.known_maps.clear();
    }

    pub(crate) fn find_npc_id(&self, map_id: &MapId, local: &str) -> Option<ObjectId> {
        let direct = ObjectId::npc(map_id, local);
        if self.tables.npcs.contains_key(&direct) {
            return Some(direct);
        }
        self.tables
            .npcs
            .values()
            .find(|npc| &npc.map_id == map_id && npc.local_id.matches(local))
            .map(|npc| npc.id.clone())
    }

    pub(crate) fn find_script_object_id(&self, map_id: &MapId, local: &str) -> Option<ObjectId> {
        let direct = ObjectId::script_object(map_id, local);
        if self.tables.script_objects.contains_key(&direct) {
            return Some(direct);
        }
        self.tables
            .script_objects
            .values()
            .find(|object| &object.map_id == map_id && object.local_id.matches(local))
            .map(|object| object.id.clone())
    }

    /// Resolves a persisted NPC id, falling back to the numeric local id
    /// when the stored key names the template position.
    pub(crate) fn resolve_npc_key(&self, raw: &str) -> Option<ObjectId> {
        let direct = ObjectId::from(raw);
        if self.tables.npcs.contains_key(&direct) {
            return Some(direct);
        }
        let (map, local) = ObjectId::split_keyed(raw, ObjectCategory::Npc)?;
        self.find_npc_id(&MapId::new(map), local)
    }

    pub(crate) fn resolve_script_object_key(&self, raw: &str) -> Option<ObjectId> {
        let direct = ObjectId::from(raw);
        if self.tables.script_objects.contains_key(&direct) {
            return Some(direct);
        }
        let (map, local) = ObjectId::split_keyed(raw, ObjectCategory::ScriptObject)?;
        self.find_script_object_id(&MapId::new(map), local)
    }

    pub(crate) fn report_unknown_map(&self, map_id: &MapId, operation: &'static str) {
        debug_assert!(
            self.known_maps.contains(map_id),
            "{operation} called for map {map_id} that was never populated"
        );
        if self.known_maps.contains(map_id) {
            debug!(map_id = %map_id, operation, "map_not_resident");
        } else {
            warn!(map_id = %map_id, operation, "map_never_populated");
        }
    }
}

fn insert_unique<T: ObjectRecord>(table: &mut BTreeMap<ObjectId, T>, record: T) -> bool {
    if table.contains_key(record.id()) {
        warn!(object_id = %record.id(), "duplicate_object_id_skipped");
        return false;
    }
    table.insert(record.id().clone(), record);
    true
}

fn shift_map<T: ObjectRecord>(
    table: &mut BTreeMap<ObjectId, T>,
    map_id: &MapId,
    delta: TileOffset,
) {
    for record in table.values_mut().filter(|record| record.map_id() == map_id) {
        record.shift(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryFlagStore;
    use crate::geometry::TilePos;
    use crate::raw::{RawBgEvent, RawObjectEvent};

    fn object(graphics: &str, local_id: Option<&str>, x: i32, y: i32) -> RawObjectEvent {
        RawObjectEvent {
            local_id: local_id.map(ToString::to_string),
            graphics_id: graphics.to_string(),
            x,
            y,
            script: "Route104_EventScript_Talk".to_string(),
            flag: "0".to_string(),
            ..RawObjectEvent::default()
        }
    }

    fn route104() -> MapInstance {
        let mut item = object("OBJ_EVENT_GFX_ITEM_BALL", None, 6, 7);
        item.script = "Route104_EventScript_ItemPokeBall".to_string();
        item.flag = "FLAG_ITEM_ROUTE_104_POKE_BALL".to_string();
        let mut decoration = object("OBJ_EVENT_GFX_VAR_0", None, 1, 1);
        decoration.flag = "FLAG_DECORATION_1".to_string();
        MapInstance::new("MAP_ROUTE104", TileOffset::new(10, 20))
            .with_object_events(vec![
                object("OBJ_EVENT_GFX_FISHERMAN", Some("LOCALID_FISHERMAN"), 3, 4),
                item,
                object("OBJ_EVENT_GFX_MR_BRINEYS_BOAT", Some("LOCALID_BOAT"), 9, 9),
                object("OBJ_EVENT_GFX_TRUCK", None, 2, 2),
                decoration,
                object("OBJ_EVENT_GFX_BERRY_TREE", None, 5, 5),
            ])
            .with_bg_events(vec![RawBgEvent {
                kind: "sign".to_string(),
                x: 8,
                y: 1,
                script: "Route104_EventScript_Sign".to_string(),
                ..RawBgEvent::default()
            }])
    }

    #[test]
    fn populate_sorts_descriptors_into_tables() {
        let mut store = EntityStore::default();
        let flags = MemoryFlagStore::with_flags(["FLAG_ITEM_ROUTE_104_POKE_BALL"]);
        let summary = store.populate(&route104(), &flags).expect("populated");

        assert_eq!(summary.npcs, 2);
        assert_eq!(summary.items, 1);
        assert_eq!(summary.large_objects, 1);
        assert_eq!(summary.script_objects, 1);
        assert_eq!(summary.bg_events, 1);
        assert_eq!(summary.skipped, 1);

        let map = MapId::new("MAP_ROUTE104");
        let boat = store.find_npc_id(&map, "LOCALID_BOAT").expect("boat");
        assert_eq!(store.tables().npcs[&boat].tile, TilePos::new(19, 29));
        assert!(store.tables().items.values().all(|item| item.collected));
        assert_eq!(store.map_offset(&map), Some(TileOffset::new(10, 20)));
    }

    #[test]
    fn second_populate_is_a_no_op() {
        let mut store = EntityStore::default();
        let flags = MemoryFlagStore::new();
        store.populate(&route104(), &flags).expect("populated");
        let version = store.version();
        assert_eq!(store.populate(&route104(), &flags), None);
        assert_eq!(store.version(), version);
        assert_eq!(store.tables().npcs.len(), 2);
    }

    #[test]
    fn numeric_local_ids_resolve_named_records() {
        let mut store = EntityStore::default();
        store
            .populate(&route104(), &MemoryFlagStore::new())
            .expect("populated");
        let map = MapId::new("MAP_ROUTE104");
        assert_eq!(
            store.find_npc_id(&map, "1"),
            store.find_npc_id(&map, "LOCALID_FISHERMAN")
        );
        assert_eq!(
            store.resolve_npc_key("MAP_ROUTE104_npc_3"),
            store.find_npc_id(&map, "LOCALID_BOAT")
        );
        assert_eq!(store.resolve_npc_key("MAP_ROUTE104_npc_9"), None);
        assert!(store.find_script_object_id(&map, "6").is_some());
    }

    #[test]
    fn reposition_shifts_current_and_template_tiles() {
        let mut store = EntityStore::default();
        store
            .populate(&route104(), &MemoryFlagStore::new())
            .expect("populated");
        let map = MapId::new("MAP_ROUTE104");
        assert!(store.reposition(&map, TileOffset::new(-10, 5)));

        let id = store.find_npc_id(&map, "LOCALID_FISHERMAN").expect("npc");
        let npc = &store.tables().npcs[&id];
        assert_eq!(npc.tile, TilePos::new(3, 29));
        assert_eq!(npc.initial_tile, TilePos::new(3, 29));
        assert_eq!(store.map_offset(&map), Some(TileOffset::new(0, 25)));
        let sign = store.tables().bg_events.values().next().expect("sign");
        assert_eq!(sign.tile, TilePos::new(8, 26));
    }

    #[test]
    fn remove_drops_only_that_map() {
        let mut store = EntityStore::default();
        let flags = MemoryFlagStore::new();
        store.populate(&route104(), &flags).expect("route 104");
        let other = MapInstance::new("MAP_PETALBURG_WOODS", TileOffset::new(0, 0))
            .with_object_events(vec![object("OBJ_EVENT_GFX_BUG_CATCHER", None, 1, 1)]);
        store.populate(&other, &flags).expect("woods");

        assert_eq!(store.remove(&MapId::new("MAP_ROUTE104")), Some(6));
        assert_eq!(store.tables().npcs.len(), 1);
        assert!(!store.has_map(&MapId::new("MAP_ROUTE104")));
        assert_eq!(store.map_ids().count(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "never populated")]
    fn unknown_map_operations_assert_in_debug() {
        let mut store = EntityStore::default();
        store.remove(&MapId::new("MAP_NOWHERE"));
    }
}
