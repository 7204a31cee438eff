use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::TilePos;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(String);

impl MapId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MapId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    Npc,
    Item,
    ScriptObject,
    LargeObject,
    BgEvent,
}

impl ObjectCategory {
    fn token(self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::Item => "item",
            Self::ScriptObject => "obj",
            Self::LargeObject => "large",
            Self::BgEvent => "bg",
        }
    }
}

/// Composite `{map}_{category}_{key}` identifier. Coordinate-keyed ids use
/// map-local tiles so they are stable across re-anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn npc(map_id: &MapId, local_key: &str) -> Self {
        Self::keyed(map_id, ObjectCategory::Npc, local_key)
    }

    pub fn script_object(map_id: &MapId, local_key: &str) -> Self {
        Self::keyed(map_id, ObjectCategory::ScriptObject, local_key)
    }

    pub fn item(map_id: &MapId, local_tile: TilePos) -> Self {
        Self::at_tile(map_id, ObjectCategory::Item, local_tile)
    }

    pub fn large_object(map_id: &MapId, local_tile: TilePos) -> Self {
        Self::at_tile(map_id, ObjectCategory::LargeObject, local_tile)
    }

    pub fn bg_event(map_id: &MapId, local_tile: TilePos) -> Self {
        Self::at_tile(map_id, ObjectCategory::BgEvent, local_tile)
    }

    fn keyed(map_id: &MapId, category: ObjectCategory, key: &str) -> Self {
        Self(format!("{map_id}_{}_{key}", category.token()))
    }

    fn at_tile(map_id: &MapId, category: ObjectCategory, tile: TilePos) -> Self {
        Self(format!("{map_id}_{}_{}_{}", category.token(), tile.x, tile.y))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a keyed id into `(map, local key)` for the given category.
    pub(crate) fn split_keyed(raw: &str, category: ObjectCategory) -> Option<(&str, &str)> {
        let separator = format!("_{}_", category.token());
        let index = raw.rfind(&separator)?;
        if index == 0 {
            return None;
        }
        Some((&raw[..index], &raw[index + separator.len()..]))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Map-scoped identity: an optional symbolic name plus the 1-based position
/// of the entry in the map's object-event template array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalId {
    pub name: Option<String>,
    pub index: u16,
}

impl LocalId {
    pub fn key(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.index.to_string(),
        }
    }

    pub fn matches(&self, local: &str) -> bool {
        match &self.name {
            Some(name) if name == local => true,
            _ => local.parse::<u16>().ok() == Some(self.index),
        }
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_ids_split_back_into_map_and_local() {
        let map = MapId::new("MAP_ROUTE101");
        let id = ObjectId::npc(&map, "LOCALID_ROUTE101_BIRCH");
        assert_eq!(id.as_str(), "MAP_ROUTE101_npc_LOCALID_ROUTE101_BIRCH");
        assert_eq!(
            ObjectId::split_keyed(id.as_str(), ObjectCategory::Npc),
            Some(("MAP_ROUTE101", "LOCALID_ROUTE101_BIRCH"))
        );
        assert_eq!(
            ObjectId::split_keyed("MAP_ROUTE101_npc_2", ObjectCategory::Npc),
            Some(("MAP_ROUTE101", "2"))
        );
        assert_eq!(ObjectId::split_keyed("_npc_2", ObjectCategory::Npc), None);
    }

    #[test]
    fn coordinate_ids_use_local_tiles() {
        let map = MapId::new("MAP_ROUTE102");
        assert_eq!(
            ObjectId::item(&map, TilePos::new(7, -1)).as_str(),
            "MAP_ROUTE102_item_7_-1"
        );
    }

    #[test]
    fn local_id_matches_name_or_template_index() {
        let named = LocalId {
            name: Some("LOCALID_MOM".to_string()),
            index: 3,
        };
        assert!(named.matches("LOCALID_MOM"));
        assert!(named.matches("3"));
        assert!(!named.matches("4"));
        assert_eq!(named.key(), "LOCALID_MOM");

        let unnamed = LocalId {
            name: None,
            index: 2,
        };
        assert_eq!(unnamed.key(), "2");
        assert!(unnamed.matches("2"));
    }
}
