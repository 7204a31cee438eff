use crate::geometry::{TilePos, ViewSize, ViewWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectEventConfig {
    /// Tiles added beyond the raw viewport on the left, right and bottom.
    pub spawn_margin_tiles: i32,
    pub legacy_view_tiles: ViewSize,
    /// Distance from the player's tile to the legacy camera's top-left tile.
    pub legacy_player_offset: i32,
    /// Sub-tile offsets above this many pixels still occupy the previous tile.
    pub occupancy_threshold_px: i16,
}

impl Default for ObjectEventConfig {
    fn default() -> Self {
        Self {
            spawn_margin_tiles: 2,
            legacy_view_tiles: ViewSize::new(15, 14),
            legacy_player_offset: 7,
            occupancy_threshold_px: 0,
        }
    }
}

impl ObjectEventConfig {
    /// Window anchored on the render camera's top-left tile. The top edge has
    /// no margin, matching the hardware spawn check.
    pub fn camera_window(&self, camera: TilePos, view: ViewSize) -> ViewWindow {
        let margin = self.spawn_margin_tiles;
        ViewWindow {
            left: camera.x - margin,
            right: camera.x + view.width + margin,
            top: camera.y,
            bottom: camera.y + view.height + margin,
        }
    }

    /// Legacy camera-follow window derived from the player's tile.
    pub fn player_window(&self, player: TilePos) -> ViewWindow {
        let camera = TilePos::new(
            player.x - self.legacy_player_offset,
            player.y - self.legacy_player_offset,
        );
        self.camera_window(camera, self.legacy_view_tiles)
    }
}
