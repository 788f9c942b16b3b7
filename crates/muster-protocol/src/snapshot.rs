//! Full-state snapshots.
//!
//! A [`GameSnapshot`] is the complete client-visible state of one game. It
//! is sent as the `state` message when a client connects, re-sent on
//! `request_state`, and serialized into solo-game save slots — one shape
//! for all three, so a save is exactly what a reconnecting client would
//! have seen.

use serde::{Deserialize, Serialize};

use crate::types::{
    Deployment, GameCode, GameId, GameStatus, ObjectiveId, ObjectiveStatus,
    PlayerId, UnitId,
};

/// Everything a client needs to render one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub code: GameCode,
    pub name: String,
    pub status: GameStatus,
    pub is_solo: bool,
    pub current_round: u32,
    pub max_rounds: u32,
    pub current_player_id: Option<PlayerId>,
    pub players: Vec<PlayerSnapshot>,
    pub units: Vec<UnitSnapshot>,
    pub objectives: Vec<ObjectiveSnapshot>,
}

/// One player seat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    /// Display color, CSS hex.
    pub color: String,
    pub is_host: bool,
    pub is_connected: bool,
    pub victory_points: u32,
    /// Unit count at game start, for the morale readout.
    pub starting_unit_count: u32,
    pub starting_points: u32,
}

/// One unit: the imported profile plus its live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub player_id: PlayerId,
    pub name: String,
    pub custom_name: Option<String>,
    pub quality: u8,
    pub defense: u8,
    /// Models in the unit at full strength.
    pub size: u32,
    /// Wounds per model.
    pub tough: u32,
    pub cost: u32,
    pub is_hero: bool,
    pub is_transport: bool,
    pub has_ambush: bool,
    /// Set when this unit is a hero attached to another unit.
    pub parent_unit_id: Option<UnitId>,
    pub state: UnitStateSnapshot,
}

/// The mutable half of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStateSnapshot {
    /// Wounds left on the current model.
    pub wounds_remaining: u32,
    pub models_remaining: u32,
    pub is_activated: bool,
    pub is_shaken: bool,
    pub deployment: Deployment,
    /// The transport this unit is embarked in, when `deployment` is
    /// `embarked`.
    pub transport_id: Option<UnitId>,
}

/// One objective marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSnapshot {
    pub id: ObjectiveId,
    pub marker_number: u32,
    pub status: ObjectiveStatus,
    pub controlled_by: Option<PlayerId>,
}
