use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use object_events::{
    FlagStore, MemoryFlagStore, ObjectEventManager, RuntimeSnapshot, SnapshotError, TilePos,
    ViewSize, WorldSnapshot,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub const WORLD_ENV_VAR: &str = "FIELD_REPLAY_WORLD";
pub const SCRIPT_ENV_VAR: &str = "FIELD_REPLAY_SCRIPT";
pub const DEFAULT_VIEW: ViewSize = ViewSize::new(20, 15);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path} at {at}: {source}")]
    Decode {
        path: PathBuf,
        at: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("{0}")]
    Usage(String),
}

/// Fixture paths resolved from positional args, falling back to env vars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayPaths {
    pub world: PathBuf,
    pub script: PathBuf,
}

impl ReplayPaths {
    pub fn resolve(
        args: &[String],
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ReplayError> {
        if args.len() > 2 {
            return Err(ReplayError::Usage(format!(
                "expected at most 2 arguments, got {}",
                args.len()
            )));
        }
        let pick = |index: usize, var: &str| -> Result<PathBuf, ReplayError> {
            args.get(index)
                .cloned()
                .or_else(|| env_lookup(var).filter(|value| !value.trim().is_empty()))
                .map(PathBuf::from)
                .ok_or_else(|| ReplayError::Usage(format!("missing path (argument or {var})")))
        };
        Ok(Self {
            world: pick(0, WORLD_ENV_VAR)?,
            script: pick(1, SCRIPT_ENV_VAR)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplayScript {
    /// Flags raised before any map is populated.
    pub flags: Vec<String>,
    pub frames: Vec<ReplayFrame>,
}

/// One simulated tick. `camera` takes precedence over `player` when both
/// are given; a frame with neither only applies its flag changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplayFrame {
    pub camera: Option<TilePos>,
    pub view: Option<ViewSize>,
    pub player: Option<TilePos>,
    pub set_flags: Vec<String>,
    pub clear_flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: usize,
    pub npcs: usize,
    pub items: usize,
    pub script_objects: usize,
    pub large_objects: usize,
    pub spawned: usize,
    pub despawned: usize,
    pub reconciled: usize,
}

#[derive(Debug)]
pub struct ReplayOutcome {
    pub frames: Vec<FrameReport>,
    pub snapshot: RuntimeSnapshot,
}

pub fn load_world(path: &Path) -> Result<WorldSnapshot, ReplayError> {
    load_json(path)
}

pub fn load_script(path: &Path) -> Result<ReplayScript, ReplayError> {
    load_json(path)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReplayError> {
    let raw = fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_json(path, &raw)
}

fn decode_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, ReplayError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        ReplayError::Decode {
            path: path.to_path_buf(),
            at,
            source: error.into_inner(),
        }
    })
}

pub fn run_replay(world: &WorldSnapshot, script: &ReplayScript) -> ReplayOutcome {
    let mut flags = MemoryFlagStore::with_flags(script.flags.iter().cloned());
    let mut manager = ObjectEventManager::default();
    manager.populate_world(world, &flags);

    let frames = script
        .frames
        .iter()
        .enumerate()
        .map(|(index, frame)| run_frame(&mut manager, &mut flags, index, frame))
        .collect::<Vec<_>>();

    let snapshot = manager.export_runtime_snapshot();
    info!(
        frame_count = frames.len(),
        raised_flags = flags.raised_count(),
        npc_records = snapshot.npcs.len(),
        "replay_finished"
    );
    ReplayOutcome { frames, snapshot }
}

fn run_frame(
    manager: &mut ObjectEventManager,
    flags: &mut MemoryFlagStore,
    index: usize,
    frame: &ReplayFrame,
) -> FrameReport {
    for name in &frame.set_flags {
        flags.set(name);
    }
    for name in &frame.clear_flags {
        flags.clear(name);
    }
    let reconciled = if frame.set_flags.is_empty() && frame.clear_flags.is_empty() {
        0
    } else {
        manager.reconcile_all(flags)
    };

    let changes = match (frame.camera, frame.player) {
        (Some(camera), _) => {
            manager.update_spawn_despawn_for_camera(camera, frame.view.unwrap_or(DEFAULT_VIEW))
        }
        (None, Some(player)) => manager.update_spawn_despawn(player),
        (None, None) => Default::default(),
    };

    let visible = manager.visible_objects();
    let report = FrameReport {
        frame: index,
        npcs: visible.npcs.len(),
        items: visible.items.len(),
        script_objects: visible.script_objects.len(),
        large_objects: visible.large_objects.len(),
        spawned: changes.spawned.len(),
        despawned: changes.despawned.len(),
        reconciled,
    };
    if changes.is_empty() && reconciled == 0 {
        debug!(frame = index, "replay_frame_steady");
    } else {
        info!(
            frame = index,
            npcs = report.npcs,
            items = report.items,
            script_objects = report.script_objects,
            large_objects = report.large_objects,
            spawned = report.spawned,
            despawned = report.despawned,
            reconciled,
            "replay_frame"
        );
    }
    report
}
