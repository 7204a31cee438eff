use std::collections::BTreeMap;

use crate::classify::{DisguiseState, MovementKind};
use crate::geometry::{Direction, TileOffset, TilePos};
use crate::ids::MapId;
use crate::records::NpcObject;

/// Identifies the authored content an entry was captured from. A map whose
/// object layout changed under the same id must not inherit stale reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentFingerprint {
    graphics_id: String,
    template_movement_raw: String,
    authored_local_tile: TilePos,
    variant: Option<String>,
}

impl ContentFingerprint {
    fn of(npc: &NpcObject, variant: Option<&str>) -> Self {
        Self {
            graphics_id: npc.graphics_id.clone(),
            template_movement_raw: npc.template_movement_raw.clone(),
            authored_local_tile: npc.authored_local_tile,
            variant: variant.map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RevealedEntry {
    fingerprint: ContentFingerprint,
    local_tile: TilePos,
    local_initial_tile: TilePos,
    direction: Direction,
    movement_type_raw: String,
}

/// Revealed disguise/burial state that survives a map being unloaded and
/// loaded again, keyed by `(map id, local key)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RevealedDisguiseStore {
    entries: BTreeMap<(MapId, String), RevealedEntry>,
}

impl RevealedDisguiseStore {
    pub(crate) fn is_revealed(npc: &NpcObject) -> bool {
        MovementKind::parse(&npc.template_movement_raw)
            .disguise_kind()
            .is_some()
            && !npc.sprite_hidden
    }

    /// Records or forgets `npc` depending on whether it is currently revealed.
    pub(crate) fn capture(&mut self, npc: &NpcObject, offset: TileOffset, variant: Option<&str>) {
        let key = (npc.map_id.clone(), npc.local_id.key());
        if !Self::is_revealed(npc) {
            self.entries.remove(&key);
            return;
        }
        self.entries.insert(
            key,
            RevealedEntry {
                fingerprint: ContentFingerprint::of(npc, variant),
                local_tile: npc.tile.relative_to(offset),
                local_initial_tile: npc.initial_tile.relative_to(offset),
                direction: npc.direction,
                movement_type_raw: npc.movement_type_raw.clone(),
            },
        );
    }

    /// Applies a captured reveal to a freshly populated record. Returns
    /// whether anything was restored.
    pub(crate) fn restore(
        &self,
        npc: &mut NpcObject,
        offset: TileOffset,
        variant: Option<&str>,
    ) -> bool {
        let key = (npc.map_id.clone(), npc.local_id.key());
        let Some(entry) = self.entries.get(&key) else {
            return false;
        };
        if entry.fingerprint != ContentFingerprint::of(npc, variant) {
            return false;
        }
        npc.tile = entry.local_tile.offset_by(offset);
        npc.initial_tile = entry.local_initial_tile.offset_by(offset);
        npc.direction = entry.direction;
        npc.movement_type_raw = entry.movement_type_raw.clone();
        npc.movement = MovementKind::parse(&entry.movement_type_raw);
        npc.sprite_hidden = false;
        npc.disguise = npc.movement.disguise_kind().map(|kind| DisguiseState {
            kind,
            active: false,
            revealing: false,
        });
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
