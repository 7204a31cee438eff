use std::collections::HashSet;

use crate::geometry::TilePos;
use crate::ids::ObjectId;

/// Elevation value the tile layer uses for "no override".
pub const ELEVATION_UNSPECIFIED: u8 = 15;

/// Global named-boolean store owned by the host. Reads must not have side
/// effects on the object-event manager.
pub trait FlagStore {
    fn is_set(&self, name: &str) -> bool;
    fn set(&mut self, name: &str);
    fn clear(&mut self, name: &str);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFlagStore {
    raised: HashSet<String>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            raised: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn raised_count(&self) -> usize {
        self.raised.len()
    }
}

impl FlagStore for MemoryFlagStore {
    fn is_set(&self, name: &str) -> bool {
        self.raised.contains(name)
    }

    fn set(&mut self, name: &str) {
        self.raised.insert(name.to_string());
    }

    fn clear(&mut self, name: &str) {
        self.raised.remove(name);
    }
}

/// Flag reference parsed from map data. `"0"` and the empty string mean no
/// flag: always visible, never collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum FlagRef {
    #[default]
    None,
    Named(String),
}

impl FlagRef {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "0" {
            Self::None
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Named(name) => Some(name),
        }
    }

    pub fn is_raised(&self, flags: &dyn FlagStore) -> bool {
        self.name().is_some_and(|name| flags.is_set(name))
    }

    pub fn raise(&self, flags: &mut dyn FlagStore) {
        if let Some(name) = self.name() {
            flags.set(name);
        }
    }
}

/// Per-tile terrain lookup. `None` or [`ELEVATION_UNSPECIFIED`] keeps the
/// entity's own elevation.
pub trait TileResolver {
    fn elevation_at(&self, tile: TilePos) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownTerrain;

impl TileResolver for UnknownTerrain {
    fn elevation_at(&self, _tile: TilePos) -> Option<u8> {
        None
    }
}

pub(crate) fn resolved_elevation(terrain: &dyn TileResolver, tile: TilePos, fallback: u8) -> u8 {
    match terrain.elevation_at(tile) {
        Some(elevation) if elevation != ELEVATION_UNSPECIFIED => elevation,
        _ => fallback,
    }
}

/// Receives walk-state invalidations whenever an NPC is despawned or reset.
pub trait MovementListener {
    fn remove_entity(&mut self, id: &ObjectId);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMovementEngine;

impl MovementListener for NoMovementEngine {
    fn remove_entity(&mut self, _id: &ObjectId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTerrain(Option<u8>);

    impl TileResolver for FixedTerrain {
        fn elevation_at(&self, _tile: TilePos) -> Option<u8> {
            self.0
        }
    }

    #[test]
    fn zero_and_empty_flags_are_no_flag() {
        assert_eq!(FlagRef::parse("0"), FlagRef::None);
        assert_eq!(FlagRef::parse("  "), FlagRef::None);
        assert_eq!(
            FlagRef::parse("FLAG_HIDE_MOM"),
            FlagRef::Named("FLAG_HIDE_MOM".to_string())
        );

        let mut flags = MemoryFlagStore::new();
        FlagRef::None.raise(&mut flags);
        assert_eq!(flags.raised_count(), 0);
        assert!(!FlagRef::None.is_raised(&flags));
    }

    #[test]
    fn resolved_elevation_keeps_fallback_for_unspecified_terrain() {
        let tile = TilePos::new(1, 1);
        assert_eq!(resolved_elevation(&UnknownTerrain, tile, 3), 3);
        assert_eq!(resolved_elevation(&FixedTerrain(Some(15)), tile, 3), 3);
        assert_eq!(resolved_elevation(&FixedTerrain(Some(1)), tile, 3), 1);
    }
}
