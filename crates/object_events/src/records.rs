use serde::{Deserialize, Serialize};

use crate::classify::{
    is_berry_tree_graphics, item_from_script, script_name, BgEventKind, DisguiseState,
    FacingRequirement, ItemRef, MovementKind, TrainerKind,
};
use crate::collaborators::{FlagRef, ELEVATION_UNSPECIFIED};
use crate::geometry::{Direction, SubTileOffset, TileOffset, TilePos};
use crate::ids::{LocalId, MapId, ObjectId};
use crate::raw::{RawBgEvent, RawObjectEvent};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tint {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NpcObject {
    pub id: ObjectId,
    pub map_id: MapId,
    pub local_id: LocalId,
    pub graphics_id: String,
    pub tile: TilePos,
    pub initial_tile: TilePos,
    /// Map-local tile as authored in map data; never moved at runtime.
    pub authored_local_tile: TilePos,
    pub elevation: u8,
    pub direction: Direction,
    pub initial_direction: Direction,
    pub movement_type_raw: String,
    pub movement: MovementKind,
    /// Movement type as authored; part of the revealed-disguise fingerprint.
    pub template_movement_raw: String,
    pub movement_range_x: i32,
    pub movement_range_y: i32,
    pub trainer: TrainerKind,
    pub trainer_sight_range: u8,
    pub script: Option<String>,
    pub flag: FlagRef,
    pub visible: bool,
    pub sprite_hidden: bool,
    pub script_removed: bool,
    pub disguise: Option<DisguiseState>,
    pub tint: Option<Tint>,
    pub render_above_grass: bool,
    pub sub_tile: SubTileOffset,
    pub is_walking: bool,
}

impl NpcObject {
    pub(crate) fn from_raw(
        map_id: &MapId,
        local_id: LocalId,
        raw: &RawObjectEvent,
        offset: TileOffset,
    ) -> Self {
        let authored_local_tile = TilePos::new(raw.x, raw.y);
        let tile = authored_local_tile.offset_by(offset);
        let movement = MovementKind::parse(&raw.movement_type);
        let direction = movement.facing().unwrap_or_default();
        let disguise = movement.disguise_kind().map(DisguiseState::concealed);
        Self {
            id: ObjectId::npc(map_id, &local_id.key()),
            map_id: map_id.clone(),
            local_id,
            graphics_id: raw.graphics_id.trim().to_string(),
            tile,
            initial_tile: tile,
            authored_local_tile,
            elevation: clamp_elevation(raw.elevation),
            direction,
            initial_direction: direction,
            movement_type_raw: raw.movement_type.trim().to_string(),
            movement,
            template_movement_raw: raw.movement_type.trim().to_string(),
            movement_range_x: raw.movement_range_x,
            movement_range_y: raw.movement_range_y,
            trainer: TrainerKind::parse(&raw.trainer_type),
            trainer_sight_range: raw
                .trainer_sight_or_berry_tree_id
                .trim()
                .parse()
                .unwrap_or(0),
            script: script_name(&raw.script).map(ToString::to_string),
            flag: FlagRef::parse(&raw.flag),
            visible: true,
            sprite_hidden: disguise.is_some(),
            script_removed: false,
            disguise,
            tint: None,
            render_above_grass: false,
            sub_tile: SubTileOffset::ZERO,
            is_walking: false,
        }
    }

    /// Re-spawn from template: position, facing and motion state, not resume.
    pub(crate) fn reset_to_template(&mut self) {
        self.tile = self.initial_tile;
        self.direction = self.initial_direction;
        self.sub_tile = SubTileOffset::ZERO;
        self.is_walking = false;
    }

    pub fn is_disguised(&self) -> bool {
        self.disguise.is_some_and(|state| state.active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBall {
    pub id: ObjectId,
    pub map_id: MapId,
    pub tile: TilePos,
    pub elevation: u8,
    /// `None` for story balls whose script does not name an item.
    pub item: Option<ItemRef>,
    pub script: Option<String>,
    pub flag: FlagRef,
    pub collected: bool,
}

impl ItemBall {
    pub(crate) fn from_raw(map_id: &MapId, raw: &RawObjectEvent, offset: TileOffset) -> Self {
        let local = TilePos::new(raw.x, raw.y);
        Self {
            id: ObjectId::item(map_id, local),
            map_id: map_id.clone(),
            tile: local.offset_by(offset),
            elevation: clamp_elevation(raw.elevation),
            item: item_from_script(&raw.script),
            script: script_name(&raw.script).map(ToString::to_string),
            flag: FlagRef::parse(&raw.flag),
            collected: false,
        }
    }

    pub fn is_story_ball(&self) -> bool {
        self.item.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptObject {
    pub id: ObjectId,
    pub map_id: MapId,
    pub local_id: LocalId,
    pub graphics_id: String,
    pub tile: TilePos,
    pub initial_tile: TilePos,
    pub elevation: u8,
    pub script: String,
    pub flag: FlagRef,
    pub visible: bool,
    pub script_removed: bool,
    pub berry_tree_id: Option<u16>,
}

impl ScriptObject {
    pub(crate) fn from_raw(
        map_id: &MapId,
        local_id: LocalId,
        raw: &RawObjectEvent,
        offset: TileOffset,
    ) -> Option<Self> {
        let script = script_name(&raw.script)?.to_string();
        let tile = TilePos::new(raw.x, raw.y).offset_by(offset);
        let graphics_id = raw.graphics_id.trim().to_string();
        let berry_tree_id = if is_berry_tree_graphics(&graphics_id) {
            raw.trainer_sight_or_berry_tree_id
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|id| *id > 0)
        } else {
            None
        };
        Some(Self {
            id: ObjectId::script_object(map_id, &local_id.key()),
            map_id: map_id.clone(),
            local_id,
            graphics_id,
            tile,
            initial_tile: tile,
            elevation: clamp_elevation(raw.elevation),
            script,
            flag: FlagRef::parse(&raw.flag),
            visible: true,
            script_removed: false,
            berry_tree_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeObject {
    pub id: ObjectId,
    pub map_id: MapId,
    pub graphics_id: String,
    pub tile: TilePos,
    pub initial_tile: TilePos,
    pub elevation: u8,
    pub flag: FlagRef,
    pub visible: bool,
}

impl LargeObject {
    pub(crate) fn from_raw(map_id: &MapId, raw: &RawObjectEvent, offset: TileOffset) -> Self {
        let local = TilePos::new(raw.x, raw.y);
        let tile = local.offset_by(offset);
        Self {
            id: ObjectId::large_object(map_id, local),
            map_id: map_id.clone(),
            graphics_id: raw.graphics_id.trim().to_string(),
            tile,
            initial_tile: tile,
            elevation: clamp_elevation(raw.elevation),
            flag: FlagRef::parse(&raw.flag),
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgEvent {
    pub id: ObjectId,
    pub map_id: MapId,
    pub kind: BgEventKind,
    pub tile: TilePos,
    pub elevation: u8,
    pub facing: FacingRequirement,
    pub script: Option<String>,
    pub item: Option<String>,
    pub flag: FlagRef,
    pub collected: bool,
}

impl BgEvent {
    pub(crate) fn from_raw(map_id: &MapId, raw: &RawBgEvent, offset: TileOffset) -> Option<Self> {
        let kind = BgEventKind::parse(&raw.kind)?;
        let local = TilePos::new(raw.x, raw.y);
        let item = raw.item.trim();
        Some(Self {
            id: ObjectId::bg_event(map_id, local),
            map_id: map_id.clone(),
            kind,
            tile: local.offset_by(offset),
            elevation: clamp_elevation(raw.elevation),
            facing: FacingRequirement::parse(&raw.player_facing_dir),
            script: script_name(&raw.script).map(ToString::to_string),
            item: (!item.is_empty()).then(|| item.to_string()),
            flag: FlagRef::parse(&raw.flag),
            collected: false,
        })
    }
}

pub(crate) trait ObjectRecord {
    fn id(&self) -> &ObjectId;
    fn map_id(&self) -> &MapId;
    /// Flag-driven presence, before the offscreen set is applied.
    fn shown(&self) -> bool;
    fn shift(&mut self, delta: TileOffset);
}

impl ObjectRecord for NpcObject {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn map_id(&self) -> &MapId {
        &self.map_id
    }

    fn shown(&self) -> bool {
        self.visible
    }

    fn shift(&mut self, delta: TileOffset) {
        self.tile = self.tile.offset_by(delta);
        self.initial_tile = self.initial_tile.offset_by(delta);
    }
}

impl ObjectRecord for ItemBall {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn map_id(&self) -> &MapId {
        &self.map_id
    }

    fn shown(&self) -> bool {
        !self.collected
    }

    fn shift(&mut self, delta: TileOffset) {
        self.tile = self.tile.offset_by(delta);
    }
}

impl ObjectRecord for ScriptObject {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn map_id(&self) -> &MapId {
        &self.map_id
    }

    fn shown(&self) -> bool {
        self.visible
    }

    fn shift(&mut self, delta: TileOffset) {
        self.tile = self.tile.offset_by(delta);
        self.initial_tile = self.initial_tile.offset_by(delta);
    }
}

impl ObjectRecord for LargeObject {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn map_id(&self) -> &MapId {
        &self.map_id
    }

    fn shown(&self) -> bool {
        self.visible
    }

    fn shift(&mut self, delta: TileOffset) {
        self.tile = self.tile.offset_by(delta);
        self.initial_tile = self.initial_tile.offset_by(delta);
    }
}

impl ObjectRecord for BgEvent {
    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn map_id(&self) -> &MapId {
        &self.map_id
    }

    fn shown(&self) -> bool {
        !self.collected
    }

    fn shift(&mut self, delta: TileOffset) {
        self.tile = self.tile.offset_by(delta);
    }
}

fn clamp_elevation(raw: i32) -> u8 {
    raw.clamp(0, i32::from(ELEVATION_UNSPECIFIED)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DisguiseKind;

    fn map() -> MapId {
        MapId::new("MAP_ROUTE111")
    }

    #[test]
    fn npc_from_raw_applies_offset_and_template_facing() {
        let raw = RawObjectEvent {
            local_id: Some("LOCALID_HIKER".to_string()),
            graphics_id: "OBJ_EVENT_GFX_HIKER".to_string(),
            x: 4,
            y: 9,
            elevation: 3,
            movement_type: "MOVEMENT_TYPE_FACE_LEFT".to_string(),
            trainer_type: "TRAINER_TYPE_NORMAL".to_string(),
            trainer_sight_or_berry_tree_id: "3".to_string(),
            flag: "0".to_string(),
            ..RawObjectEvent::default()
        };
        let local_id = LocalId {
            name: raw.local_id.clone(),
            index: 1,
        };
        let npc = NpcObject::from_raw(&map(), local_id, &raw, TileOffset::new(10, -5));

        assert_eq!(npc.id.as_str(), "MAP_ROUTE111_npc_LOCALID_HIKER");
        assert_eq!(npc.tile, TilePos::new(14, 4));
        assert_eq!(npc.initial_tile, npc.tile);
        assert_eq!(npc.direction, Direction::Left);
        assert_eq!(npc.trainer, TrainerKind::Normal);
        assert_eq!(npc.trainer_sight_range, 3);
        assert_eq!(npc.flag, FlagRef::None);
        assert!(!npc.sprite_hidden);
        assert_eq!(npc.disguise, None);
    }

    #[test]
    fn disguised_npc_starts_concealed() {
        let raw = RawObjectEvent {
            graphics_id: "OBJ_EVENT_GFX_RUIN_MANIAC".to_string(),
            movement_type: "MOVEMENT_TYPE_MOUNTAIN_DISGUISE".to_string(),
            elevation: 40,
            ..RawObjectEvent::default()
        };
        let local_id = LocalId {
            name: None,
            index: 4,
        };
        let npc = NpcObject::from_raw(&map(), local_id, &raw, TileOffset::default());

        assert_eq!(npc.id.as_str(), "MAP_ROUTE111_npc_4");
        assert!(npc.sprite_hidden);
        assert_eq!(npc.disguise, Some(DisguiseState::concealed(DisguiseKind::Mountain)));
        assert!(npc.is_disguised());
        assert_eq!(npc.elevation, 15);
    }

    #[test]
    fn item_ball_ids_use_local_tiles() {
        let raw = RawObjectEvent {
            graphics_id: "OBJ_EVENT_GFX_ITEM_BALL".to_string(),
            x: 2,
            y: 3,
            script: "Route111_EventScript_ItemElixir".to_string(),
            flag: "FLAG_ITEM_ROUTE_111_ELIXIR".to_string(),
            ..RawObjectEvent::default()
        };
        let ball = ItemBall::from_raw(&map(), &raw, TileOffset::new(100, 100));

        assert_eq!(ball.id.as_str(), "MAP_ROUTE111_item_2_3");
        assert_eq!(ball.tile, TilePos::new(102, 103));
        assert_eq!(ball.item.as_ref().map(|item| item.item_id.as_str()), Some("ITEM_ELIXIR"));
        assert!(!ball.is_story_ball());
    }

    #[test]
    fn berry_tree_keeps_its_tree_id() {
        let raw = RawObjectEvent {
            graphics_id: "OBJ_EVENT_GFX_BERRY_TREE".to_string(),
            trainer_sight_or_berry_tree_id: "12".to_string(),
            script: "BerryTreeScript".to_string(),
            ..RawObjectEvent::default()
        };
        let local_id = LocalId {
            name: None,
            index: 7,
        };
        let tree = ScriptObject::from_raw(&map(), local_id, &raw, TileOffset::default())
            .expect("script object");
        assert_eq!(tree.berry_tree_id, Some(12));
        assert_eq!(tree.id.as_str(), "MAP_ROUTE111_obj_7");
    }

    #[test]
    fn unknown_bg_event_kinds_are_dropped() {
        let raw = RawBgEvent {
            kind: "weather".to_string(),
            ..RawBgEvent::default()
        };
        assert_eq!(BgEvent::from_raw(&map(), &raw, TileOffset::default()), None);
    }
}
