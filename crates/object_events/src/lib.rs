mod cache;
mod classify;
mod collaborators;
mod collision;
mod config;
mod geometry;
mod ids;
mod manager;
mod raw;
mod reconcile;
mod records;
mod scheduler;
mod snapshot;
mod store;

pub use cache::{OffscreenSets, VisibleObjects, VisibleSet};
pub use classify::{
    classify, is_large_object_graphics, is_npc_graphics, item_from_script, BgEventKind,
    DisguiseKind, DisguiseState, FacingRequirement, GraphicsClass, ItemRef, MovementKind,
    TrainerKind,
};
pub use collaborators::{
    FlagRef, FlagStore, MemoryFlagStore, MovementListener, NoMovementEngine, TileResolver,
    UnknownTerrain, ELEVATION_UNSPECIFIED,
};
pub use collision::{elevation_matches, Interaction, ScriptSource, ScriptTarget};
pub use config::ObjectEventConfig;
pub use geometry::{Direction, SubTileOffset, TileOffset, TilePos, ViewSize, ViewWindow};
pub use ids::{LocalId, MapId, ObjectCategory, ObjectId};
pub use manager::{ObjectEventManager, PositionScope};
pub use raw::{MapInstance, RawBgEvent, RawObjectEvent, WorldSnapshot};
pub use records::{BgEvent, ItemBall, LargeObject, NpcObject, ScriptObject, Tint};
pub use scheduler::SpawnChanges;
pub use snapshot::{
    CoordSpace, ImportReport, ItemRuntime, LargeObjectRuntime, NpcRuntime, OffscreenIds,
    RuntimeSnapshot, ScriptObjectRuntime, SnapshotError, RUNTIME_SNAPSHOT_VERSION,
};
pub use store::PopulateSummary;
