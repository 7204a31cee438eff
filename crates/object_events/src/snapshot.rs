use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::OffscreenSets;
use crate::classify::{DisguiseState, MovementKind};
use crate::geometry::{Direction, SubTileOffset, TileOffset, TilePos};
use crate::ids::{MapId, ObjectId};
use crate::records::Tint;
use crate::store::EntityStore;

pub const RUNTIME_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to decode runtime snapshot at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode runtime snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("unsupported runtime snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// How tile coordinates in a snapshot are expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSpace {
    /// Relative to the owning map's offset at export time.
    #[default]
    MapLocal,
    World,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcRuntime {
    pub tile: TilePos,
    pub initial_tile: TilePos,
    pub elevation: u8,
    pub direction: Direction,
    pub movement_type: String,
    pub visible: bool,
    pub sprite_hidden: bool,
    pub script_removed: bool,
    #[serde(default)]
    pub disguise: Option<DisguiseState>,
    #[serde(default)]
    pub tint: Option<Tint>,
    #[serde(default)]
    pub render_above_grass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRuntime {
    pub collected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptObjectRuntime {
    pub tile: TilePos,
    pub visible: bool,
    #[serde(default)]
    pub script_removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargeObjectRuntime {
    pub visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffscreenIds {
    #[serde(default)]
    pub npcs: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub script_objects: Vec<String>,
    #[serde(default)]
    pub large_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub version: u32,
    pub coord_space: CoordSpace,
    #[serde(default)]
    pub npcs: BTreeMap<String, NpcRuntime>,
    #[serde(default)]
    pub items: BTreeMap<String, ItemRuntime>,
    #[serde(default)]
    pub script_objects: BTreeMap<String, ScriptObjectRuntime>,
    #[serde(default)]
    pub large_objects: BTreeMap<String, LargeObjectRuntime>,
    #[serde(default)]
    pub offscreen: OffscreenIds,
}

impl RuntimeSnapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(SnapshotError::Encode)
    }

    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let snapshot: Self = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| {
                let path = error.path().to_string();
                SnapshotError::Decode {
                    path,
                    source: error.into_inner(),
                }
            },
        )?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version != RUNTIME_SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                expected: RUNTIME_SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub skipped: usize,
}

struct Coordinates {
    space: CoordSpace,
}

impl Coordinates {
    fn encode(&self, tile: TilePos, offset: Option<TileOffset>) -> TilePos {
        match (self.space, offset) {
            (CoordSpace::MapLocal, Some(offset)) => tile.relative_to(offset),
            _ => tile,
        }
    }

    fn decode(&self, tile: TilePos, offset: Option<TileOffset>) -> Option<TilePos> {
        match self.space {
            CoordSpace::MapLocal => offset.map(|offset| tile.offset_by(offset)),
            CoordSpace::World => Some(tile),
        }
    }
}

pub(crate) fn export(store: &EntityStore) -> RuntimeSnapshot {
    let tables = store.tables();
    let referenced = tables
        .npcs
        .values()
        .map(|npc| &npc.map_id)
        .chain(tables.script_objects.values().map(|object| &object.map_id))
        .collect::<BTreeSet<&MapId>>();
    let space = if referenced.iter().all(|map_id| store.map_offset(map_id).is_some()) {
        CoordSpace::MapLocal
    } else {
        CoordSpace::World
    };
    let coords = Coordinates { space };

    let npcs = tables
        .npcs
        .values()
        .map(|npc| {
            let offset = store.map_offset(&npc.map_id);
            let runtime = NpcRuntime {
                tile: coords.encode(npc.tile, offset),
                initial_tile: coords.encode(npc.initial_tile, offset),
                elevation: npc.elevation,
                direction: npc.direction,
                movement_type: npc.movement_type_raw.clone(),
                visible: npc.visible,
                sprite_hidden: npc.sprite_hidden,
                script_removed: npc.script_removed,
                disguise: npc.disguise,
                tint: npc.tint,
                render_above_grass: npc.render_above_grass,
            };
            (npc.id.to_string(), runtime)
        })
        .collect();
    let items = tables
        .items
        .values()
        .map(|item| {
            let runtime = ItemRuntime {
                collected: item.collected,
            };
            (item.id.to_string(), runtime)
        })
        .collect();
    let script_objects = tables
        .script_objects
        .values()
        .map(|object| {
            let offset = store.map_offset(&object.map_id);
            let runtime = ScriptObjectRuntime {
                tile: coords.encode(object.tile, offset),
                visible: object.visible,
                script_removed: object.script_removed,
            };
            (object.id.to_string(), runtime)
        })
        .collect();
    let large_objects = tables
        .large_objects
        .values()
        .map(|object| {
            let runtime = LargeObjectRuntime {
                visible: object.visible,
            };
            (object.id.to_string(), runtime)
        })
        .collect();
    let offscreen = OffscreenIds {
        npcs: id_strings(&tables.offscreen.npcs),
        items: id_strings(&tables.offscreen.items),
        script_objects: id_strings(&tables.offscreen.script_objects),
        large_objects: id_strings(&tables.offscreen.large_objects),
    };

    let snapshot = RuntimeSnapshot {
        version: RUNTIME_SNAPSHOT_VERSION,
        coord_space: space,
        npcs,
        items,
        script_objects,
        large_objects,
        offscreen,
    };
    info!(
        coord_space = ?space,
        npc_count = snapshot.npcs.len(),
        item_count = snapshot.items.len(),
        offscreen_count = tables.offscreen.total(),
        "runtime_snapshot_exported"
    );
    snapshot
}

fn id_strings(ids: &BTreeSet<ObjectId>) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

/// Applies `snapshot` to the resident records. Ids that no longer resolve
/// are skipped rather than failing the restore.
pub(crate) fn import(
    store: &mut EntityStore,
    snapshot: &RuntimeSnapshot,
) -> Result<ImportReport, SnapshotError> {
    snapshot.check_version()?;
    let coords = Coordinates {
        space: snapshot.coord_space,
    };
    let mut report = ImportReport::default();

    let mut npc_updates = Vec::new();
    for (raw_id, runtime) in &snapshot.npcs {
        let resolved = store.resolve_npc_key(raw_id).and_then(|id| {
            let offset = store.map_offset(&store.tables().npcs.get(&id)?.map_id);
            let tile = coords.decode(runtime.tile, offset)?;
            let initial_tile = coords.decode(runtime.initial_tile, offset)?;
            Some((id, tile, initial_tile))
        });
        match resolved {
            Some(update) => npc_updates.push((update, runtime)),
            None => skip_unresolved(&mut report, raw_id, "npc"),
        }
    }

    let mut item_updates = Vec::new();
    for (raw_id, runtime) in &snapshot.items {
        let id = ObjectId::from(raw_id.as_str());
        if store.tables().items.contains_key(&id) {
            item_updates.push((id, runtime.collected));
        } else {
            skip_unresolved(&mut report, raw_id, "item");
        }
    }

    let mut script_updates = Vec::new();
    for (raw_id, runtime) in &snapshot.script_objects {
        let resolved = store.resolve_script_object_key(raw_id).and_then(|id| {
            let offset = store.map_offset(&store.tables().script_objects.get(&id)?.map_id);
            let tile = coords.decode(runtime.tile, offset)?;
            Some((id, tile))
        });
        match resolved {
            Some(update) => script_updates.push((update, runtime)),
            None => skip_unresolved(&mut report, raw_id, "script_object"),
        }
    }

    let mut large_updates = Vec::new();
    for (raw_id, runtime) in &snapshot.large_objects {
        let id = ObjectId::from(raw_id.as_str());
        if store.tables().large_objects.contains_key(&id) {
            large_updates.push((id, runtime.visible));
        } else {
            skip_unresolved(&mut report, raw_id, "large_object");
        }
    }

    let offscreen = OffscreenSets {
        npcs: resolve_all(&snapshot.offscreen.npcs, |raw| store.resolve_npc_key(raw)),
        items: resolve_all(&snapshot.offscreen.items, |raw| {
            let id = ObjectId::from(raw);
            store.tables().items.contains_key(&id).then_some(id)
        }),
        script_objects: resolve_all(&snapshot.offscreen.script_objects, |raw| {
            store.resolve_script_object_key(raw)
        }),
        large_objects: resolve_all(&snapshot.offscreen.large_objects, |raw| {
            let id = ObjectId::from(raw);
            store.tables().large_objects.contains_key(&id).then_some(id)
        }),
    };

    let tables = store.tables_mut();
    for ((id, tile, initial_tile), runtime) in npc_updates {
        let Some(npc) = tables.npcs.get_mut(&id) else {
            continue;
        };
        npc.tile = tile;
        npc.initial_tile = initial_tile;
        npc.elevation = runtime.elevation;
        npc.direction = runtime.direction;
        npc.movement_type_raw = runtime.movement_type.clone();
        npc.movement = MovementKind::parse(&runtime.movement_type);
        npc.visible = runtime.visible;
        npc.sprite_hidden = runtime.sprite_hidden;
        npc.script_removed = runtime.script_removed;
        npc.disguise = runtime.disguise;
        npc.tint = runtime.tint;
        npc.render_above_grass = runtime.render_above_grass;
        npc.sub_tile = SubTileOffset::ZERO;
        npc.is_walking = false;
        report.applied += 1;
    }
    for (id, collected) in item_updates {
        if let Some(item) = tables.items.get_mut(&id) {
            item.collected = collected;
            report.applied += 1;
        }
    }
    for ((id, tile), runtime) in script_updates {
        if let Some(object) = tables.script_objects.get_mut(&id) {
            object.tile = tile;
            object.visible = runtime.visible;
            object.script_removed = runtime.script_removed;
            report.applied += 1;
        }
    }
    for (id, visible) in large_updates {
        if let Some(object) = tables.large_objects.get_mut(&id) {
            object.visible = visible;
            report.applied += 1;
        }
    }
    tables.offscreen = offscreen;

    info!(
        coord_space = ?snapshot.coord_space,
        applied = report.applied,
        skipped = report.skipped,
        "runtime_snapshot_imported"
    );
    Ok(report)
}

fn skip_unresolved(report: &mut ImportReport, raw_id: &str, category: &'static str) {
    warn!(object_id = raw_id, category, "snapshot_id_unresolved");
    report.skipped += 1;
}

fn resolve_all(
    raw_ids: &[String],
    resolve: impl Fn(&str) -> Option<ObjectId>,
) -> BTreeSet<ObjectId> {
    raw_ids
        .iter()
        .filter_map(|raw| {
            let resolved = resolve(raw);
            if resolved.is_none() {
                warn!(object_id = raw.as_str(), "offscreen_id_unresolved");
            }
            resolved
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryFlagStore;
    use crate::raw::{MapInstance, RawObjectEvent};

    fn route_with_npcs(offset: TileOffset) -> MapInstance {
        MapInstance::new("MAP_ROUTE101", offset).with_object_events(vec![
            RawObjectEvent {
                local_id: Some("LOCALID_ROUTE101_BIRCH".to_string()),
                graphics_id: "OBJ_EVENT_GFX_PROF_BIRCH".to_string(),
                x: 9,
                y: 13,
                ..RawObjectEvent::default()
            },
            RawObjectEvent {
                graphics_id: "OBJ_EVENT_GFX_ZIGZAGOON_1".to_string(),
                x: 10,
                y: 13,
                ..RawObjectEvent::default()
            },
        ])
    }

    fn populated(offset: TileOffset) -> EntityStore {
        let mut store = EntityStore::default();
        store
            .populate(&route_with_npcs(offset), &MemoryFlagStore::new())
            .expect("populated");
        store
    }

    #[test]
    fn export_uses_map_local_coordinates() {
        let store = populated(TileOffset::new(100, 50));
        let snapshot = export(&store);
        assert_eq!(snapshot.coord_space, CoordSpace::MapLocal);
        let birch = &snapshot.npcs["MAP_ROUTE101_npc_LOCALID_ROUTE101_BIRCH"];
        assert_eq!(birch.tile, TilePos::new(9, 13));
    }

    #[test]
    fn import_re_anchors_to_current_offset() {
        let mut source = populated(TileOffset::new(0, 0));
        let id = source
            .find_npc_id(&MapId::new("MAP_ROUTE101"), "LOCALID_ROUTE101_BIRCH")
            .expect("birch");
        source.tables_mut().npcs.get_mut(&id).expect("birch").tile = TilePos::new(11, 14);
        let snapshot = export(&source);

        let mut target = populated(TileOffset::new(-20, 7));
        let report = import(&mut target, &snapshot).expect("import");
        assert_eq!(report, ImportReport { applied: 2, skipped: 0 });
        assert_eq!(target.tables().npcs[&id].tile, TilePos::new(-9, 21));
    }

    #[test]
    fn numeric_ids_and_stale_offscreen_ids_resolve_or_drop() {
        let mut store = populated(TileOffset::default());
        let mut snapshot = export(&store);
        let birch = snapshot
            .npcs
            .remove("MAP_ROUTE101_npc_LOCALID_ROUTE101_BIRCH")
            .expect("birch");
        snapshot.npcs.insert(
            "MAP_ROUTE101_npc_1".to_string(),
            NpcRuntime {
                visible: false,
                ..birch
            },
        );
        let orphan = snapshot.npcs["MAP_ROUTE101_npc_1"].clone();
        snapshot.npcs.insert("MAP_GONE_npc_1".to_string(), orphan);
        snapshot.offscreen.npcs = vec![
            "MAP_ROUTE101_npc_2".to_string(),
            "MAP_GONE_npc_4".to_string(),
        ];

        let report = import(&mut store, &snapshot).expect("import");
        assert_eq!(report, ImportReport { applied: 2, skipped: 1 });
        let birch_id = ObjectId::from("MAP_ROUTE101_npc_LOCALID_ROUTE101_BIRCH");
        assert!(!store.tables().npcs[&birch_id].visible);
        assert_eq!(store.tables().offscreen.npcs.len(), 1);
        assert!(store
            .tables()
            .offscreen
            .npcs
            .contains(&ObjectId::from("MAP_ROUTE101_npc_2")));
    }

    #[test]
    fn world_space_snapshots_are_applied_verbatim() {
        let mut store = populated(TileOffset::new(5, 5));
        let mut snapshot = export(&store);
        snapshot.coord_space = CoordSpace::World;
        for runtime in snapshot.npcs.values_mut() {
            runtime.tile = TilePos::new(1, 2);
        }
        import(&mut store, &snapshot).expect("import");
        assert!(store
            .tables()
            .npcs
            .values()
            .all(|npc| npc.tile == TilePos::new(1, 2)));
    }

    #[test]
    fn json_errors_carry_the_failing_path() {
        let error = RuntimeSnapshot::from_json(
            r#"{"version": 1, "coord_space": "map_local", "npcs": {"a": {"tile": 3}}}"#,
        )
        .expect_err("bad tile");
        match error {
            SnapshotError::Decode { path, .. } => assert_eq!(path, "npcs.a.tile"),
            other => panic!("unexpected error: {other}"),
        }

        let error = RuntimeSnapshot::from_json(r#"{"version": 9, "coord_space": "world"}"#)
            .expect_err("bad version");
        assert!(matches!(
            error,
            SnapshotError::UnsupportedVersion { found: 9, .. }
        ));
    }

    #[test]
    fn json_round_trip_preserves_snapshot() {
        let store = populated(TileOffset::new(3, 4));
        let snapshot = export(&store);
        let json = snapshot.to_json().expect("encode");
        assert_eq!(RuntimeSnapshot::from_json(&json).expect("decode"), snapshot);
    }
}
