//! Facade over the entity store, visible-view cache, spawn scheduler and
//! tile queries. The host drives it once per frame from the main loop.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info};

use crate::cache::{OffscreenSets, VisibilityCache, VisibleObjects, VisibleSet};
use crate::classify::{DisguiseState, ItemRef, MovementKind};
use crate::collaborators::{
    FlagStore, MovementListener, NoMovementEngine, TileResolver, UnknownTerrain,
};
use crate::collision::{Interaction, Resolver};
use crate::config::ObjectEventConfig;
use crate::geometry::{Direction, SubTileOffset, TileOffset, TilePos, ViewSize, ViewWindow};
use crate::ids::{MapId, ObjectId};
use crate::raw::{MapInstance, WorldSnapshot};
use crate::reconcile;
use crate::records::{BgEvent, ItemBall, LargeObject, NpcObject, ScriptObject, Tint};
use crate::scheduler::{SpawnChanges, SpawnSchedule};
use crate::snapshot::{self, ImportReport, RuntimeSnapshot, SnapshotError};
use crate::store::{EntityStore, PopulateSummary};


/// Whether a position write also moves the template (spawn) tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionScope {
    Temporary,
    Permanent,
}

pub struct ObjectEventManager {
    config: ObjectEventConfig,
    store: EntityStore,
    cache: VisibilityCache,
    schedule: SpawnSchedule,
    terrain: Box<dyn TileResolver>,
    movement: Box<dyn MovementListener>,
}

impl Default for ObjectEventManager {
    fn default() -> Self {
        Self::new(ObjectEventConfig::default())
    }
}

impl ObjectEventManager {
    pub fn new(config: ObjectEventConfig) -> Self {
        Self {
            config,
            store: EntityStore::default(),
            cache: VisibilityCache::default(),
            schedule: SpawnSchedule::default(),
            terrain: Box::new(UnknownTerrain),
            movement: Box::new(NoMovementEngine),
        }
    }

    pub fn config(&self) -> &ObjectEventConfig {
        &self.config
    }

    pub fn set_tile_resolver(&mut self, terrain: impl TileResolver + 'static) {
        self.terrain = Box::new(terrain);
    }

    pub fn set_movement_listener(&mut self, movement: impl MovementListener + 'static) {
        self.movement = Box::new(movement);
    }

    // Lifecycle

    pub fn populate(
        &mut self,
        map: &MapInstance,
        flags: &dyn FlagStore,
    ) -> Option<PopulateSummary> {
        let summary = self.store.populate(map, flags)?;
        self.schedule.mark_dirty();
        Some(summary)
    }

    pub fn populate_world(&mut self, world: &WorldSnapshot, flags: &dyn FlagStore) -> usize {
        let populated = world
            .maps
            .iter()
            .filter(|map| self.populate(map, flags).is_some())
            .count();
        info!(
            anchor_map_id = world.anchor_map_id.as_ref().map(MapId::as_str),
            map_count = world.maps.len(),
            populated,
            "world_objects_populated"
        );
        populated
    }

    pub fn remove_map(&mut self, map_id: &MapId) -> bool {
        let npc_ids = self
            .store
            .tables()
            .npcs
            .values()
            .filter(|npc| &npc.map_id == map_id)
            .map(|npc| npc.id.clone())
            .collect::<Vec<_>>();
        if self.store.remove(map_id).is_none() {
            return false;
        }
        for id in &npc_ids {
            self.movement.remove_entity(id);
        }
        self.schedule.mark_dirty();
        true
    }

    pub fn reposition_map(&mut self, map_id: &MapId, delta: TileOffset) -> bool {
        if !self.store.reposition(map_id, delta) {
            return false;
        }
        self.schedule.mark_dirty();
        true
    }

    /// Drops every map for a world rebuild. Revealed disguises survive.
    pub fn clear(&mut self) {
        self.store.clear();
        self.schedule.reset();
        info!("object_events_cleared");
    }

    // Scheduler

    /// Legacy camera-follow window centred on the player's tile.
    pub fn update_spawn_despawn(&mut self, player: TilePos) -> SpawnChanges {
        let window = self.config.player_window(player);
        self.update_for_window(window)
    }

    pub fn update_spawn_despawn_for_camera(
        &mut self,
        camera: TilePos,
        view: ViewSize,
    ) -> SpawnChanges {
        let window = self.config.camera_window(camera, view);
        self.update_for_window(window)
    }

    fn update_for_window(&mut self, window: ViewWindow) -> SpawnChanges {
        let changes = self
            .schedule
            .run(&mut self.store, window, self.movement.as_mut());
        if !changes.is_empty() {
            debug!(
                spawned = changes.spawned.len(),
                despawned = changes.despawned.len(),
                "spawn_window_applied"
            );
        }
        changes
    }

    pub fn last_window(&self) -> Option<ViewWindow> {
        self.schedule.last_window()
    }

    // Flag reconciliation

    pub fn reconcile_all(&mut self, flags: &dyn FlagStore) -> usize {
        let changed = reconcile::reconcile_all(&mut self.store, flags);
        self.schedule.mark_dirty();
        changed
    }

    pub fn reconcile_map_entry(&mut self, map_id: &MapId, flags: &dyn FlagStore) -> usize {
        if !self.store.has_map(map_id) {
            self.store.report_unknown_map(map_id, "reconcile_map_entry");
            return 0;
        }
        let changed = reconcile::reconcile_map_entry(&mut self.store, map_id, flags);
        self.schedule.mark_dirty();
        changed
    }

    pub fn respawn_flag_cleared(&mut self, flags: &dyn FlagStore) -> usize {
        let window = self.schedule.last_window();
        let changed =
            reconcile::respawn_flag_cleared(&mut self.store, flags, window, self.movement.as_mut());
        if changed > 0 {
            self.schedule.mark_dirty();
        }
        changed
    }

    pub fn refresh_collected_state(&mut self, flags: &dyn FlagStore) -> usize {
        let changed = reconcile::refresh_collected_state(&mut self.store, flags);
        if changed > 0 {
            self.schedule.mark_dirty();
        }
        changed
    }

    // NPC mutators. Each targets `(map, local id)` and returns false when
    // the NPC is not resident.

    pub fn set_npc_position(
        &mut self,
        map_id: &MapId,
        local: &str,
        tile: TilePos,
        scope: PositionScope,
    ) -> bool {
        let Some(id) = self.update_npc(map_id, local, |npc| {
            npc.tile = tile;
            npc.sub_tile = SubTileOffset::ZERO;
            npc.is_walking = false;
        }) else {
            return false;
        };
        self.movement.remove_entity(&id);
        if scope == PositionScope::Permanent {
            self.set_npc_template_position(map_id, local, tile);
        }
        true
    }

    pub fn set_npc_template_position(
        &mut self,
        map_id: &MapId,
        local: &str,
        tile: TilePos,
    ) -> bool {
        self.update_npc(map_id, local, |npc| npc.initial_tile = tile).is_some()
    }

    /// Showing an NPC respawns it from its template tile and facing.
    pub fn set_npc_visibility(
        &mut self,
        map_id: &MapId,
        local: &str,
        visible: bool,
        script_removed: bool,
    ) -> bool {
        let Some(id) = self.update_npc(map_id, local, |npc| {
            npc.visible = visible;
            npc.script_removed = script_removed;
            if visible {
                npc.reset_to_template();
            }
        }) else {
            return false;
        };
        if visible {
            self.store.tables_mut().offscreen.npcs.remove(&id);
            self.movement.remove_entity(&id);
        }
        self.schedule.mark_dirty();
        debug!(npc_id = %id, visible, script_removed, "npc_visibility_set");
        true
    }

    pub fn set_npc_sprite_hidden(&mut self, map_id: &MapId, local: &str, hidden: bool) -> bool {
        self.update_npc(map_id, local, |npc| npc.sprite_hidden = hidden).is_some()
    }

    /// Changes the movement type. `FACE_*` types turn the NPC; disguise and
    /// burial types install a concealed overlay, other types clear it.
    /// Template coordinates are never touched.
    pub fn set_npc_movement_type(&mut self, map_id: &MapId, local: &str, raw: &str) -> bool {
        let movement = MovementKind::parse(raw);
        self.update_npc(map_id, local, |npc| {
            npc.movement_type_raw = raw.trim().to_string();
            npc.movement = movement;
            if let Some(direction) = movement.facing() {
                npc.direction = direction;
            }
            match movement.disguise_kind() {
                Some(kind) if npc.disguise.map(|state| state.kind) != Some(kind) => {
                    npc.disguise = Some(DisguiseState::concealed(kind));
                    npc.sprite_hidden = true;
                }
                Some(_) => {}
                None => npc.disguise = None,
            }
        })
        .is_some()
    }

    pub fn start_npc_disguise_reveal(&mut self, map_id: &MapId, local: &str) -> bool {
        let revealable = self
            .npc_by_local_id(map_id, local)
            .and_then(|npc| npc.disguise)
            .is_some_and(|state| state.active);
        if !revealable {
            return false;
        }
        self.update_npc(map_id, local, |npc| {
            if let Some(state) = npc.disguise.as_mut() {
                state.revealing = true;
            }
        })
        .is_some()
    }

    pub fn complete_npc_disguise_reveal(&mut self, map_id: &MapId, local: &str) -> bool {
        if self
            .npc_by_local_id(map_id, local)
            .and_then(|npc| npc.disguise)
            .is_none()
        {
            return false;
        }
        let revealed = self.update_npc(map_id, local, |npc| {
            if let Some(state) = npc.disguise.as_mut() {
                state.active = false;
                state.revealing = false;
            }
            npc.sprite_hidden = false;
        });
        if let Some(id) = &revealed {
            debug!(npc_id = %id, "npc_disguise_revealed");
        }
        revealed.is_some()
    }

    pub fn set_npc_direction(
        &mut self,
        map_id: &MapId,
        local: &str,
        direction: Direction,
    ) -> bool {
        self.update_npc(map_id, local, |npc| npc.direction = direction).is_some()
    }

    pub fn face_npc_toward(&mut self, map_id: &MapId, local: &str, target: TilePos) -> bool {
        let Some(direction) = self
            .npc_by_local_id(map_id, local)
            .and_then(|npc| Direction::toward(npc.tile, target))
        else {
            return false;
        };
        self.set_npc_direction(map_id, local, direction)
    }

    pub fn set_npc_tint(&mut self, map_id: &MapId, local: &str, tint: Option<Tint>) -> bool {
        self.update_npc(map_id, local, |npc| npc.tint = tint).is_some()
    }

    pub fn set_npc_render_above_grass(
        &mut self,
        map_id: &MapId,
        local: &str,
        above: bool,
    ) -> bool {
        self.update_npc(map_id, local, |npc| npc.render_above_grass = above).is_some()
    }

    pub fn set_npc_elevation(&mut self, map_id: &MapId, local: &str, elevation: u8) -> bool {
        self.update_npc(map_id, local, |npc| npc.elevation = elevation).is_some()
    }

    /// Write path for the movement engine's interpolation state. Leaves the
    /// cached views in place since motion never changes membership.
    pub fn apply_npc_motion(
        &mut self,
        id: &ObjectId,
        tile: TilePos,
        direction: Direction,
        sub_tile: SubTileOffset,
        walking: bool,
    ) -> bool {
        let Some(npc) = self.store.npc_motion_mut(id) else {
            return false;
        };
        npc.tile = tile;
        npc.direction = direction;
        npc.sub_tile = sub_tile;
        npc.is_walking = walking;
        true
    }

    fn update_npc(
        &mut self,
        map_id: &MapId,
        local: &str,
        update: impl FnOnce(&mut NpcObject),
    ) -> Option<ObjectId> {
        let Some(id) = self.store.find_npc_id(map_id, local) else {
            debug!(map_id = %map_id, local_id = local, "npc_not_resident");
            return None;
        };
        let npc = self.store.tables_mut().npcs.get_mut(&id)?;
        update(npc);
        Some(id)
    }

    // Other categories

    pub fn set_script_object_visibility(
        &mut self,
        map_id: &MapId,
        local: &str,
        visible: bool,
        script_removed: bool,
    ) -> bool {
        let Some(id) = self.store.find_script_object_id(map_id, local) else {
            debug!(map_id = %map_id, local_id = local, "script_object_not_resident");
            return false;
        };
        let tables = self.store.tables_mut();
        let Some(object) = tables.script_objects.get_mut(&id) else {
            return false;
        };
        object.visible = visible;
        object.script_removed = script_removed;
        if visible {
            object.tile = object.initial_tile;
            tables.offscreen.script_objects.remove(&id);
        }
        self.schedule.mark_dirty();
        true
    }

    pub fn set_large_object_visibility(&mut self, id: &ObjectId, visible: bool) -> bool {
        if !self.store.tables().large_objects.contains_key(id) {
            return false;
        }
        let tables = self.store.tables_mut();
        let Some(object) = tables.large_objects.get_mut(id) else {
            return false;
        };
        object.visible = visible;
        if visible {
            object.tile = object.initial_tile;
            tables.offscreen.large_objects.remove(id);
        }
        self.schedule.mark_dirty();
        true
    }

    /// Picks up an item ball: raises its flag and marks it collected.
    /// Story balls and already-collected balls yield `None`.
    pub fn collect_item(&mut self, id: &ObjectId, flags: &mut dyn FlagStore) -> Option<ItemRef> {
        let item = self
            .store
            .tables()
            .items
            .get(id)
            .filter(|item| !item.collected)?;
        let item_ref = item.item.clone()?;
        item.flag.raise(flags);
        self.store.tables_mut().items.get_mut(id)?.collected = true;
        info!(object_id = %id, item_id = item_ref.item_id.as_str(), "item_collected");
        Some(item_ref)
    }

    pub fn collect_hidden_item(
        &mut self,
        id: &ObjectId,
        flags: &mut dyn FlagStore,
    ) -> Option<String> {
        let event = self
            .store
            .tables()
            .bg_events
            .get(id)
            .filter(|event| !event.collected)?;
        let item = event.item.clone()?;
        event.flag.raise(flags);
        self.store.tables_mut().bg_events.get_mut(id)?.collected = true;
        info!(object_id = %id, item_id = item.as_str(), "hidden_item_collected");
        Some(item)
    }

    // Visible views

    pub fn visible_npcs(&self) -> VisibleSet<'_, NpcObject> {
        let ids = self.cache.npcs(self.store.tables());
        VisibleSet::new(ids, &self.store.tables().npcs)
    }

    pub fn visible_item_balls(&self) -> VisibleSet<'_, ItemBall> {
        let ids = self.cache.items(self.store.tables());
        VisibleSet::new(ids, &self.store.tables().items)
    }

    pub fn visible_script_objects(&self) -> VisibleSet<'_, ScriptObject> {
        let ids = self.cache.script_objects(self.store.tables());
        VisibleSet::new(ids, &self.store.tables().script_objects)
    }

    pub fn visible_large_objects(&self) -> VisibleSet<'_, LargeObject> {
        let ids = self.cache.large_objects(self.store.tables());
        VisibleSet::new(ids, &self.store.tables().large_objects)
    }

    pub fn visible_objects(&self) -> Rc<VisibleObjects> {
        self.cache.combined(self.store.tables())
    }

    // Tile queries

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            tables: self.store.tables(),
            terrain: self.terrain.as_ref(),
            config: &self.config,
        }
    }

    pub fn npc_at(&self, tile: TilePos) -> Option<&NpcObject> {
        self.resolver().npc_at(tile)
    }

    pub fn npc_at_elevation(&self, tile: TilePos, elevation: u8) -> Option<&NpcObject> {
        self.resolver().npc_at_elevation(tile, elevation)
    }

    pub fn item_ball_at(&self, tile: TilePos, elevation: u8) -> Option<&ItemBall> {
        self.resolver().item_ball_at(tile, elevation)
    }

    pub fn script_object_at(&self, tile: TilePos, elevation: u8) -> Option<&ScriptObject> {
        self.resolver().script_object_at(tile, elevation)
    }

    pub fn npc_blocking_at(
        &self,
        tile: TilePos,
        elevation: u8,
        exclude: Option<&ObjectId>,
    ) -> Option<&NpcObject> {
        self.resolver().npc_blocking_at(tile, elevation, exclude)
    }

    pub fn has_object_collision_at(&self, tile: TilePos, elevation: u8) -> bool {
        self.resolver().has_object_collision_at(tile, elevation)
    }

    pub fn interactable_at(&self, tile: TilePos, elevation: u8) -> Option<Interaction> {
        self.resolver().interactable_at(tile, elevation)
    }

    pub fn bg_event_at(&self, tile: TilePos, facing: Direction) -> Option<&BgEvent> {
        self.resolver().bg_event_at(tile, facing)
    }

    // Read helpers

    pub fn npc(&self, id: &ObjectId) -> Option<&NpcObject> {
        self.store.tables().npcs.get(id)
    }

    pub fn npc_by_local_id(&self, map_id: &MapId, local: &str) -> Option<&NpcObject> {
        let id = self.store.find_npc_id(map_id, local)?;
        self.store.tables().npcs.get(&id)
    }

    pub fn script_object_by_local_id(
        &self,
        map_id: &MapId,
        local: &str,
    ) -> Option<&ScriptObject> {
        let id = self.store.find_script_object_id(map_id, local)?;
        self.store.tables().script_objects.get(&id)
    }

    pub fn all_npcs(&self) -> impl Iterator<Item = &NpcObject> {
        self.store.tables().npcs.values()
    }

    pub fn all_item_balls(&self) -> impl Iterator<Item = &ItemBall> {
        self.store.tables().items.values()
    }

    pub fn all_large_objects(&self) -> impl Iterator<Item = &LargeObject> {
        self.store.tables().large_objects.values()
    }

    pub fn all_bg_events(&self) -> impl Iterator<Item = &BgEvent> {
        self.store.tables().bg_events.values()
    }

    pub fn has_map_objects(&self, map_id: &MapId) -> bool {
        self.store.has_map(map_id)
    }

    pub fn resident_maps(&self) -> impl Iterator<Item = &MapId> {
        self.store.map_ids()
    }

    pub fn unique_npc_graphics_ids(&self) -> BTreeSet<&str> {
        self.all_npcs().map(|npc| npc.graphics_id.as_str()).collect()
    }

    pub fn map_offset(&self, map_id: &MapId) -> Option<TileOffset> {
        self.store.map_offset(map_id)
    }

    pub fn offscreen(&self) -> &OffscreenSets {
        &self.store.tables().offscreen
    }

    pub fn cache_version(&self) -> u64 {
        self.store.version()
    }

    pub fn cache_rebuild_count(&self) -> u64 {
        self.cache.rebuild_count()
    }

    pub fn skipped_spawn_scans(&self) -> u64 {
        self.schedule.skipped_scans()
    }

    pub fn revealed_disguise_count(&self) -> usize {
        self.store.revealed_count()
    }

    // Runtime snapshot

    pub fn export_runtime_snapshot(&self) -> RuntimeSnapshot {
        snapshot::export(&self.store)
    }

    pub fn import_runtime_snapshot(
        &mut self,
        snapshot: &RuntimeSnapshot,
    ) -> Result<ImportReport, SnapshotError> {
        let report = snapshot::import(&mut self.store, snapshot)?;
        self.schedule.mark_dirty();
        Ok(report)
    }
}
