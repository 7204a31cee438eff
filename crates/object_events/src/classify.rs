//! Converts the stringly-typed map-data identifiers into enums once, at load.

use serde::{Deserialize, Serialize};

use crate::geometry::Direction;
use crate::raw::RawObjectEvent;

const GFX_PREFIX: &str = "OBJ_EVENT_GFX_";
const ITEM_BALL_GFX: &str = "OBJ_EVENT_GFX_ITEM_BALL";
const BERRY_TREE_GFX: &str = "OBJ_EVENT_GFX_BERRY_TREE";
const DECORATION_FLAG_PREFIX: &str = "FLAG_DECORATION_";
const ITEM_SCRIPT_MARKER: &str = "_EventScript_Item";

const LARGE_OBJECT_GFX: &[&str] = &[
    "OBJ_EVENT_GFX_TRUCK",
    "OBJ_EVENT_GFX_SS_TIDAL",
    "OBJ_EVENT_GFX_SUBMARINE_SHADOW",
    "OBJ_EVENT_GFX_MR_BRINEYS_BOAT",
    "OBJ_EVENT_GFX_CABLE_CAR",
    "OBJ_EVENT_GFX_BIRTH_ISLAND_STONE",
];

// Static field props that never act like characters.
const PROP_GFX: &[&str] = &[
    BERRY_TREE_GFX,
    "OBJ_EVENT_GFX_CUTTABLE_TREE",
    "OBJ_EVENT_GFX_BREAKABLE_ROCK",
    "OBJ_EVENT_GFX_PUSHABLE_BOULDER",
    "OBJ_EVENT_GFX_FOSSIL",
    "OBJ_EVENT_GFX_BALL_CUSHION",
    "OBJ_EVENT_GFX_MIRAGE_TOWER",
    "OBJ_EVENT_GFX_LIGHT_SPRITE",
    "OBJ_EVENT_GFX_APRICORN_TREE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsClass {
    DecorationPlaceholder,
    AddressableLargeObject,
    LargeObject,
    ItemBall,
    Npc,
    ScriptObject,
    Ignored,
}

pub fn classify(raw: &RawObjectEvent) -> GraphicsClass {
    let graphics = raw.graphics_id.trim();
    if raw.flag.trim().starts_with(DECORATION_FLAG_PREFIX) {
        return GraphicsClass::DecorationPlaceholder;
    }
    if is_large_object_graphics(graphics) {
        return if raw.local_id.is_some() {
            GraphicsClass::AddressableLargeObject
        } else {
            GraphicsClass::LargeObject
        };
    }
    if graphics == ITEM_BALL_GFX {
        return GraphicsClass::ItemBall;
    }
    if is_npc_graphics(graphics) {
        return GraphicsClass::Npc;
    }
    if script_name(&raw.script).is_some() {
        return GraphicsClass::ScriptObject;
    }
    GraphicsClass::Ignored
}

pub fn is_large_object_graphics(graphics_id: &str) -> bool {
    LARGE_OBJECT_GFX.contains(&graphics_id)
}

pub fn is_npc_graphics(graphics_id: &str) -> bool {
    graphics_id.starts_with(GFX_PREFIX)
        && graphics_id.len() > GFX_PREFIX.len()
        && graphics_id != ITEM_BALL_GFX
        && !PROP_GFX.contains(&graphics_id)
        && !is_large_object_graphics(graphics_id)
}

pub(crate) fn is_berry_tree_graphics(graphics_id: &str) -> bool {
    graphics_id == BERRY_TREE_GFX
}

/// `None` for the empty-script spellings used by map data.
pub(crate) fn script_name(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    match trimmed {
        "" | "0" | "0x0" | "NULL" => None,
        _ => Some(trimmed),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    None,
    FaceUp,
    FaceDown,
    FaceLeft,
    FaceRight,
    LookAround,
    WanderAround,
    WanderUpAndDown,
    WanderLeftAndRight,
    WalkSequence,
    CopyPlayer,
    TreeDisguise,
    MountainDisguise,
    Buried,
    Invisible,
    Other,
}

impl MovementKind {
    pub fn parse(raw: &str) -> Self {
        let Some(name) = raw.trim().strip_prefix("MOVEMENT_TYPE_") else {
            return if raw.trim().is_empty() {
                Self::None
            } else {
                Self::Other
            };
        };
        match name {
            "NONE" => Self::None,
            "FACE_UP" => Self::FaceUp,
            "FACE_DOWN" => Self::FaceDown,
            "FACE_LEFT" => Self::FaceLeft,
            "FACE_RIGHT" => Self::FaceRight,
            "LOOK_AROUND" => Self::LookAround,
            "WANDER_AROUND" => Self::WanderAround,
            "WANDER_UP_AND_DOWN" => Self::WanderUpAndDown,
            "WANDER_LEFT_AND_RIGHT" => Self::WanderLeftAndRight,
            "TREE_DISGUISE" => Self::TreeDisguise,
            "MOUNTAIN_DISGUISE" => Self::MountainDisguise,
            "BURIED" => Self::Buried,
            "INVISIBLE" => Self::Invisible,
            _ if name.starts_with("WALK_SEQUENCE") => Self::WalkSequence,
            _ if name.starts_with("COPY_PLAYER") => Self::CopyPlayer,
            _ => Self::Other,
        }
    }

    /// Fixed facing imposed by the movement type, if any.
    pub fn facing(self) -> Option<Direction> {
        match self {
            Self::FaceUp => Some(Direction::Up),
            Self::FaceDown => Some(Direction::Down),
            Self::FaceLeft => Some(Direction::Left),
            Self::FaceRight => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn disguise_kind(self) -> Option<DisguiseKind> {
        match self {
            Self::TreeDisguise => Some(DisguiseKind::Tree),
            Self::MountainDisguise => Some(DisguiseKind::Mountain),
            Self::Buried => Some(DisguiseKind::Buried),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisguiseKind {
    Tree,
    Mountain,
    Buried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisguiseState {
    pub kind: DisguiseKind,
    pub active: bool,
    pub revealing: bool,
}

impl DisguiseState {
    pub fn concealed(kind: DisguiseKind) -> Self {
        Self {
            kind,
            active: true,
            revealing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrainerKind {
    #[default]
    None,
    Normal,
    SeeAllDirections,
    Buried,
}

impl TrainerKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "TRAINER_TYPE_NORMAL" => Self::Normal,
            "TRAINER_TYPE_SEE_ALL_DIRECTIONS" => Self::SeeAllDirections,
            "TRAINER_TYPE_BURIED" => Self::Buried,
            _ => Self::None,
        }
    }

    pub fn is_trainer(self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub item_id: String,
    pub name: String,
}

/// Derives the item from `<Location>_EventScript_Item<Name>[n]`. Scripts
/// outside that pattern belong to story item balls.
pub fn item_from_script(script: &str) -> Option<ItemRef> {
    let script = script_name(script)?;
    let index = script.find(ITEM_SCRIPT_MARKER)?;
    let camel = script[index + ITEM_SCRIPT_MARKER.len()..]
        .trim_end_matches(|c: char| c.is_ascii_digit());
    if camel.is_empty() || !camel.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let words = split_camel_words(camel);
    let item_id = format!(
        "ITEM_{}",
        words
            .iter()
            .map(|word| word.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("_")
    );
    let name = words.join(" ");
    Some(ItemRef { item_id, name })
}

// "PPUp" -> ["PP", "Up"], "PokeBall" -> ["Poke", "Ball"].
fn split_camel_words(camel: &str) -> Vec<String> {
    let chars = camel.chars().collect::<Vec<_>>();
    let mut words = Vec::new();
    let mut current = String::new();
    for (index, ch) in chars.iter().copied().enumerate() {
        let starts_word = ch.is_ascii_uppercase()
            && !current.is_empty()
            && {
                let prev_lower = chars[index - 1].is_ascii_lowercase();
                let next_lower = chars.get(index + 1).is_some_and(|c| c.is_ascii_lowercase());
                prev_lower || next_lower
            };
        if starts_word {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BgEventKind {
    Sign,
    HiddenItem,
    SecretBase,
}

impl BgEventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "sign" => Some(Self::Sign),
            "hidden_item" => Some(Self::HiddenItem),
            "secret_base" => Some(Self::SecretBase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FacingRequirement {
    #[default]
    Any,
    Facing(Direction),
}

impl FacingRequirement {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "BG_EVENT_PLAYER_FACING_NORTH" => Self::Facing(Direction::Up),
            "BG_EVENT_PLAYER_FACING_SOUTH" => Self::Facing(Direction::Down),
            "BG_EVENT_PLAYER_FACING_WEST" => Self::Facing(Direction::Left),
            "BG_EVENT_PLAYER_FACING_EAST" => Self::Facing(Direction::Right),
            _ => Self::Any,
        }
    }

    pub fn allows(self, facing: Direction) -> bool {
        match self {
            Self::Any => true,
            Self::Facing(required) => required == facing,
        }
    }
}
