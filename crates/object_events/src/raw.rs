//! Map-data descriptors as they arrive from the world loader.
//!
//! Every field defaults so that a partially malformed entry still yields a
//! descriptor; classification decides later whether it is usable.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::geometry::TileOffset;
use crate::ids::MapId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObjectEvent {
    #[serde(deserialize_with = "loose_optional_string")]
    pub local_id: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub graphics_id: String,
    #[serde(deserialize_with = "loose_i32")]
    pub x: i32,
    #[serde(deserialize_with = "loose_i32")]
    pub y: i32,
    #[serde(deserialize_with = "loose_i32")]
    pub elevation: i32,
    #[serde(deserialize_with = "loose_string")]
    pub movement_type: String,
    #[serde(deserialize_with = "loose_i32")]
    pub movement_range_x: i32,
    #[serde(deserialize_with = "loose_i32")]
    pub movement_range_y: i32,
    #[serde(deserialize_with = "loose_string")]
    pub trainer_type: String,
    #[serde(deserialize_with = "loose_string")]
    pub trainer_sight_or_berry_tree_id: String,
    #[serde(deserialize_with = "loose_string")]
    pub script: String,
    #[serde(deserialize_with = "loose_string")]
    pub flag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBgEvent {
    #[serde(rename = "type", deserialize_with = "loose_string")]
    pub kind: String,
    #[serde(deserialize_with = "loose_i32")]
    pub x: i32,
    #[serde(deserialize_with = "loose_i32")]
    pub y: i32,
    #[serde(deserialize_with = "loose_i32")]
    pub elevation: i32,
    #[serde(deserialize_with = "loose_string")]
    pub player_facing_dir: String,
    #[serde(deserialize_with = "loose_string")]
    pub script: String,
    #[serde(deserialize_with = "loose_string")]
    pub item: String,
    #[serde(deserialize_with = "loose_string")]
    pub flag: String,
}

/// One map placed into the stitched world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInstance {
    pub id: MapId,
    #[serde(default)]
    pub offset_x: i32,
    #[serde(default)]
    pub offset_y: i32,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    /// Content variant tag for maps whose object layout is swapped at
    /// runtime under the same map id.
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub object_events: Vec<RawObjectEvent>,
    #[serde(default)]
    pub bg_events: Vec<RawBgEvent>,
}

impl MapInstance {
    pub fn new(id: impl Into<String>, offset: TileOffset) -> Self {
        Self {
            id: MapId::new(id),
            offset_x: offset.x,
            offset_y: offset.y,
            width: 0,
            height: 0,
            variant: None,
            object_events: Vec::new(),
            bg_events: Vec::new(),
        }
    }

    pub fn with_object_events(mut self, object_events: Vec<RawObjectEvent>) -> Self {
        self.object_events = object_events;
        self
    }

    pub fn with_bg_events(mut self, bg_events: Vec<RawBgEvent>) -> Self {
        self.bg_events = bg_events;
        self
    }

    pub fn offset(&self) -> TileOffset {
        TileOffset::new(self.offset_x, self.offset_y)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default)]
    pub anchor_map_id: Option<MapId>,
    #[serde(default)]
    pub maps: Vec<MapInstance>,
}

struct LooseStringVisitor;

impl<'de> Visitor<'de> for LooseStringVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string, number, bool or null")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(value.to_string())
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(if value { "1" } else { "0" }.to_string())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(String::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(String::new())
    }
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    deserializer.deserialize_any(LooseStringVisitor)
}

fn loose_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = loose_string(deserializer)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

/// Accepts numbers and numeric strings; anything unparseable becomes 0.
fn loose_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = loose_string(deserializer)?;
    let trimmed = value.trim();
    if let Ok(parsed) = trimmed.parse::<i32>() {
        return Ok(parsed);
    }
    Ok(trimmed
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .map(|parsed| parsed.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_event_accepts_numeric_and_string_fields() {
        let raw: RawObjectEvent = serde_json::from_value(json!({
            "local_id": "LOCALID_BIRCH",
            "graphics_id": "OBJ_EVENT_GFX_PROF_BIRCH",
            "x": "9",
            "y": 13,
            "elevation": 3,
            "trainer_sight_or_berry_tree_id": 5,
            "flag": 0
        }))
        .expect("raw object event");

        assert_eq!(raw.local_id.as_deref(), Some("LOCALID_BIRCH"));
        assert_eq!((raw.x, raw.y, raw.elevation), (9, 13, 3));
        assert_eq!(raw.trainer_sight_or_berry_tree_id, "5");
        assert_eq!(raw.flag, "0");
        assert_eq!(raw.movement_type, "");
    }

    #[test]
    fn malformed_numbers_degrade_to_zero() {
        let raw: RawObjectEvent = serde_json::from_value(json!({
            "graphics_id": "OBJ_EVENT_GFX_BOY_1",
            "x": "twelve",
            "y": null,
            "local_id": null
        }))
        .expect("raw object event");

        assert_eq!((raw.x, raw.y), (0, 0));
        assert_eq!(raw.local_id, None);
    }

    #[test]
    fn null_and_numeric_strings_keep_the_rest_of_the_map() {
        let world: WorldSnapshot = serde_json::from_value(json!({
            "maps": [{
                "id": "MAP_ROUTE102",
                "object_events": [
                    {
                        "graphics_id": "OBJ_EVENT_GFX_BUG_CATCHER",
                        "x": 8, "y": 14,
                        "movement_type": null,
                        "script": null
                    },
                    {
                        "local_id": "LOCALID_ROUTE102_LASS",
                        "graphics_id": "OBJ_EVENT_GFX_LASS",
                        "x": 24, "y": 4,
                        "script": "Route102_EventScript_Lass"
                    }
                ],
                "bg_events": [{
                    "type": null,
                    "x": 3, "y": 9,
                    "player_facing_dir": 0,
                    "item": null
                }]
            }]
        }))
        .expect("world snapshot");

        let map = &world.maps[0];
        assert_eq!(map.object_events.len(), 2);
        assert_eq!(map.object_events[0].script, "");
        assert_eq!(map.object_events[0].movement_type, "");
        assert_eq!(map.object_events[1].script, "Route102_EventScript_Lass");
        assert_eq!(map.bg_events[0].player_facing_dir, "0");
        assert_eq!(map.bg_events[0].item, "");
    }

    #[test]
    fn map_instance_defaults_missing_event_lists() {
        let map: MapInstance = serde_json::from_value(json!({
            "id": "MAP_LITTLEROOT_TOWN",
            "offset_x": 4
        }))
        .expect("map instance");

        assert_eq!(map.offset(), TileOffset::new(4, 0));
        assert!(map.object_events.is_empty());
        assert!(map.bg_events.is_empty());
        assert_eq!(map.variant, None);
    }
}
