use crate::cache::Tables;
use crate::collaborators::{resolved_elevation, TileResolver, ELEVATION_UNSPECIFIED};
use crate::config::ObjectEventConfig;
use crate::geometry::{Direction, TilePos};
use crate::ids::{MapId, ObjectId};
use crate::records::{BgEvent, ItemBall, NpcObject, ScriptObject};

/// Query elevations 0 and 15 match any target; otherwise exact equality.
pub fn elevation_matches(query: u8, target: u8) -> bool {
    query == 0 || query == ELEVATION_UNSPECIFIED || query == target
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Object,
    StoryItemBall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTarget {
    pub object_id: ObjectId,
    pub map_id: MapId,
    pub script: Option<String>,
    pub source: ScriptSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Item(ObjectId),
    Npc(ObjectId),
    Script(ScriptTarget),
}

pub(crate) struct Resolver<'a> {
    pub(crate) tables: &'a Tables,
    pub(crate) terrain: &'a dyn TileResolver,
    pub(crate) config: &'a ObjectEventConfig,
}

impl<'a> Resolver<'a> {
    fn terrain_elevation(&self, tile: TilePos, own: u8) -> u8 {
        resolved_elevation(self.terrain, tile, own)
    }

    pub(crate) fn npc_at(&self, tile: TilePos) -> Option<&'a NpcObject> {
        let tables = self.tables;
        tables
            .npcs
            .values()
            .find(|npc| npc.tile == tile && tables.npc_present(npc))
    }

    pub(crate) fn npc_at_elevation(&self, tile: TilePos, elevation: u8) -> Option<&'a NpcObject> {
        let tables = self.tables;
        tables.npcs.values().find(|npc| {
            npc.tile == tile
                && tables.npc_present(npc)
                && elevation_matches(elevation, self.terrain_elevation(npc.tile, npc.elevation))
        })
    }

    pub(crate) fn item_ball_at(&self, tile: TilePos, elevation: u8) -> Option<&'a ItemBall> {
        let tables = self.tables;
        tables.items.values().find(|item| {
            item.tile == tile
                && tables.item_present(item)
                && elevation_matches(elevation, self.terrain_elevation(item.tile, item.elevation))
        })
    }

    pub(crate) fn script_object_at(
        &self,
        tile: TilePos,
        elevation: u8,
    ) -> Option<&'a ScriptObject> {
        let tables = self.tables;
        tables.script_objects.values().find(|object| {
            object.tile == tile
                && tables.script_object_present(object)
                && elevation_matches(
                    elevation,
                    self.terrain_elevation(object.tile, object.elevation),
                )
        })
    }

    /// Tiles an NPC blocks: its own tile, plus the tile it is stepping out of
    /// while a walk is in progress.
    pub(crate) fn npc_occupies(&self, npc: &NpcObject, tile: TilePos) -> bool {
        if npc.tile == tile {
            return true;
        }
        if !npc.is_walking {
            return false;
        }
        let threshold = self.config.occupancy_threshold_px;
        let step_x = if npc.sub_tile.x.abs() > threshold {
            i32::from(npc.sub_tile.x.signum())
        } else {
            0
        };
        let step_y = if npc.sub_tile.y.abs() > threshold {
            i32::from(npc.sub_tile.y.signum())
        } else {
            0
        };
        (step_x != 0 || step_y != 0)
            && TilePos::new(npc.tile.x + step_x, npc.tile.y + step_y) == tile
    }

    pub(crate) fn npc_blocking_at(
        &self,
        tile: TilePos,
        elevation: u8,
        exclude: Option<&ObjectId>,
    ) -> Option<&'a NpcObject> {
        let tables = self.tables;
        tables.npcs.values().find(|npc| {
            exclude != Some(&npc.id)
                && tables.npc_present(npc)
                && self.npc_occupies(npc, tile)
                && elevation_matches(elevation, self.terrain_elevation(npc.tile, npc.elevation))
        })
    }

    pub(crate) fn has_object_collision_at(&self, tile: TilePos, elevation: u8) -> bool {
        self.item_ball_at(tile, elevation).is_some()
            || self.script_object_at(tile, elevation).is_some()
            || self.npc_blocking_at(tile, elevation, None).is_some()
    }

    pub(crate) fn interactable_at(&self, tile: TilePos, elevation: u8) -> Option<Interaction> {
        if let Some(item) = self.item_ball_at(tile, elevation) {
            if item.is_story_ball() {
                return Some(Interaction::Script(ScriptTarget {
                    object_id: item.id.clone(),
                    map_id: item.map_id.clone(),
                    script: item.script.clone(),
                    source: ScriptSource::StoryItemBall,
                }));
            }
            return Some(Interaction::Item(item.id.clone()));
        }
        if let Some(npc) = self.npc_at_elevation(tile, elevation) {
            return Some(Interaction::Npc(npc.id.clone()));
        }
        self.script_object_at(tile, elevation).map(|object| {
            Interaction::Script(ScriptTarget {
                object_id: object.id.clone(),
                map_id: object.map_id.clone(),
                script: Some(object.script.clone()),
                source: ScriptSource::Object,
            })
        })
    }

    /// Background trigger at `tile` usable while facing `facing`. Collected
    /// hidden items are skipped.
    pub(crate) fn bg_event_at(&self, tile: TilePos, facing: Direction) -> Option<&'a BgEvent> {
        self.tables
            .bg_events
            .values()
            .find(|event| event.tile == tile && !event.collected && event.facing.allows(facing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::UnknownTerrain;
    use crate::geometry::{SubTileOffset, TileOffset};
    use crate::ids::LocalId;
    use crate::raw::RawObjectEvent;

    struct WaterAt(TilePos, u8);

    impl TileResolver for WaterAt {
        fn elevation_at(&self, tile: TilePos) -> Option<u8> {
            (tile == self.0).then_some(self.1)
        }
    }

    fn npc_at(x: i32, y: i32, elevation: i32) -> NpcObject {
        let raw = RawObjectEvent {
            graphics_id: "OBJ_EVENT_GFX_SWIMMER_M".to_string(),
            x,
            y,
            elevation,
            ..RawObjectEvent::default()
        };
        let local_id = LocalId {
            name: None,
            index: 1,
        };
        NpcObject::from_raw(&MapId::new("MAP_ROUTE109"), local_id, &raw, TileOffset::default())
    }

    fn tables_with(npc: NpcObject) -> Tables {
        let mut tables = Tables::default();
        tables.npcs.insert(npc.id.clone(), npc);
        tables
    }

    #[test]
    fn elevation_wildcards_are_query_side() {
        assert!(elevation_matches(0, 4));
        assert!(elevation_matches(15, 4));
        assert!(elevation_matches(4, 4));
        assert!(!elevation_matches(3, 4));
        assert!(!elevation_matches(3, 0));
    }

    #[test]
    fn npc_elevation_comes_from_terrain() {
        let tables = tables_with(npc_at(4, 4, 3));
        let config = ObjectEventConfig::default();
        let water = WaterAt(TilePos::new(4, 4), 1);
        let resolver = Resolver {
            tables: &tables,
            terrain: &water,
            config: &config,
        };
        assert!(resolver.npc_at_elevation(TilePos::new(4, 4), 1).is_some());
        assert!(resolver.npc_at_elevation(TilePos::new(4, 4), 3).is_none());

        let unknown = Resolver {
            tables: &tables,
            terrain: &UnknownTerrain,
            config: &config,
        };
        assert!(unknown.npc_at_elevation(TilePos::new(4, 4), 3).is_some());
    }

    #[test]
    fn walking_npc_blocks_previous_tile() {
        let mut npc = npc_at(11, 8, 3);
        npc.is_walking = true;
        npc.sub_tile = SubTileOffset::new(-8, 0);
        let tables = tables_with(npc);
        let config = ObjectEventConfig::default();
        let resolver = Resolver {
            tables: &tables,
            terrain: &UnknownTerrain,
            config: &config,
        };
        assert!(resolver.has_object_collision_at(TilePos::new(11, 8), 3));
        assert!(resolver.has_object_collision_at(TilePos::new(10, 8), 3));
        assert!(!resolver.has_object_collision_at(TilePos::new(9, 8), 3));
        assert!(!resolver.has_object_collision_at(TilePos::new(12, 8), 3));
    }

    #[test]
    fn excluded_npc_does_not_block_itself() {
        let npc = npc_at(2, 2, 0);
        let id = npc.id.clone();
        let tables = tables_with(npc);
        let config = ObjectEventConfig::default();
        let resolver = Resolver {
            tables: &tables,
            terrain: &UnknownTerrain,
            config: &config,
        };
        assert!(resolver.npc_blocking_at(TilePos::new(2, 2), 0, Some(&id)).is_none());
        assert!(resolver.npc_blocking_at(TilePos::new(2, 2), 0, None).is_some());
    }
}
