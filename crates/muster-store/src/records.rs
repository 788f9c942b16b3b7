//! The rows the engine reads and writes.
//!
//! Records are plain data. Invariants (wound floors, attach depth, status
//! transitions) are enforced by the engine before anything lands here.

use chrono::{DateTime, Utc};
use muster_protocol::{
    Deployment, EventId, EventKind, GameCode, GameId, GameStatus, ObjectiveId,
    ObjectiveStatus, PlayerId, SaveId, UnitId,
};

/// One game session.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub code: GameCode,
    pub name: String,
    pub status: GameStatus,
    pub is_solo: bool,
    pub current_round: u32,
    pub max_rounds: u32,
    pub current_player_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    /// Bumped by every mutation (including event-log clears); the reaper
    /// measures idleness from it.
    pub last_activity_at: DateTime<Utc>,
    /// Set once by the reaper. Event-log reads stay open until 24 h after
    /// this instant.
    pub expired_at: Option<DateTime<Utc>>,
}

/// One player seat in a game.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    pub color: String,
    pub is_host: bool,
    /// Live WebSocket presence, maintained by the connection handler.
    pub is_connected: bool,
    pub victory_points: u32,
    pub starting_unit_count: u32,
    pub starting_points: u32,
    pub joined_at: DateTime<Utc>,
}

/// A unit's imported profile plus its mutable table state.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: UnitId,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub name: String,
    pub custom_name: Option<String>,
    pub quality: u8,
    pub defense: u8,
    /// Models at full strength.
    pub size: u32,
    /// Wounds per model.
    pub tough: u32,
    pub cost: u32,
    pub is_hero: bool,
    pub is_transport: bool,
    pub has_ambush: bool,
    /// Present when this unit is a hero attached to another unit.
    /// Depth is at most one: a unit with children never has a parent.
    pub parent_unit_id: Option<UnitId>,
    pub state: UnitState,
}

impl Unit {
    /// The name players see: custom name if set, profile name otherwise.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }
}

/// The mutable half of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitState {
    /// Wounds left on the current model. Runs `tough ..= 1`, then a model
    /// is removed and it resets to `tough`.
    pub wounds_remaining: u32,
    pub models_remaining: u32,
    pub is_activated: bool,
    pub is_shaken: bool,
    pub deployment: Deployment,
    pub transport_id: Option<UnitId>,
}

impl UnitState {
    /// State of a freshly added unit: full strength, ambushers start
    /// off-table.
    pub fn fresh(size: u32, tough: u32, has_ambush: bool) -> Self {
        Self {
            wounds_remaining: tough.max(1),
            models_remaining: size.max(1),
            is_activated: false,
            is_shaken: false,
            deployment: if has_ambush {
                Deployment::InAmbush
            } else {
                Deployment::Normal
            },
            transport_id: None,
        }
    }
}

/// One entry in a game's event log.
///
/// The store keeps events in insertion order per game; "latest" queries
/// are defined against that order.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub id: EventId,
    pub game_id: GameId,
    pub kind: EventKind,
    pub description: String,
    pub round: u32,
    pub player_id: Option<PlayerId>,
    pub unit_id: Option<UnitId>,
    /// Signed magnitude for wound/heal/VP/round events; the consolidation
    /// rules compare these.
    pub delta: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// One objective marker on the table.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub id: ObjectiveId,
    pub game_id: GameId,
    pub marker_number: u32,
    pub status: ObjectiveStatus,
    pub controlled_by: Option<PlayerId>,
}

/// A solo-game save slot. The snapshot is the same JSON a client would
/// receive as a `state` message.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSave {
    pub id: SaveId,
    pub game_id: GameId,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub snapshot: serde_json::Value,
}
