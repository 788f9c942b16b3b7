//! Identity types and domain enums.
//!
//! Every id is a uuid newtype. The wrappers exist so a `UnitId` can never
//! be handed to a function expecting a `PlayerId`; `#[serde(transparent)]`
//! keeps them plain uuid strings on the wire.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mints a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(
    /// A unique identifier for a game session.
    GameId
);
id_newtype!(
    /// A unique identifier for a player seat within a game.
    PlayerId
);
id_newtype!(
    /// A unique identifier for a unit (profile plus live state).
    UnitId
);
id_newtype!(
    /// A unique identifier for an objective marker.
    ObjectiveId
);
id_newtype!(
    /// A unique identifier for a logged game event.
    EventId
);
id_newtype!(
    /// A unique identifier for a solo-game save slot.
    SaveId
);

// ---------------------------------------------------------------------------
// GameCode — the human-facing join code
// ---------------------------------------------------------------------------

/// Characters a join code may contain. `0`, `O`, `I` and `1` are excluded
/// because players read these codes off a screen across a table.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated join code.
const CODE_LEN: usize = 6;

/// A six-character join code identifying a game to humans.
///
/// Codes are stored and compared uppercase; [`GameCode::new`] normalizes
/// whatever the client typed, so `"ab2xyz "` and `"AB2XYZ"` are the same
/// game. Uniqueness among non-expired games is the store's job — the code
/// itself is just a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(String);

impl GameCode {
    /// Normalizes client input into a code (trim + uppercase).
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Generates a random six-character code from the restricted alphabet.
    ///
    /// Collisions are possible; the caller retries against the store until
    /// the code is unique among active games.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameCode {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ---------------------------------------------------------------------------
// Domain enums
// ---------------------------------------------------------------------------

/// Lifecycle of a game session.
///
/// ```text
///   lobby ──start──▶ active ──▶ completed
///     │                │
///     └────────────────┴──reaper──▶ expired   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Players are joining and importing armies.
    Lobby,
    /// The game is underway.
    Active,
    /// Played to a finish.
    Completed,
    /// Reaped for inactivity. Mutations are rejected from here on.
    Expired,
}

impl GameStatus {
    /// Expired games reject every mutating operation.
    pub fn is_expired(self) -> bool {
        matches!(self, GameStatus::Expired)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Lobby => "lobby",
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
            GameStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Where a unit is on (or off) the table.
///
/// `Destroyed` is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// On the table.
    Normal,
    /// Held off-table, waiting to ambush.
    InAmbush,
    /// Riding inside a transport unit.
    Embarked,
    /// Removed from play.
    Destroyed,
}

/// The actions a unit can take when activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Rush,
    Advance,
    Hold,
    Charge,
    Attack,
}

impl ActionKind {
    /// Charge and attack are directed at enemy units and make no sense
    /// without at least one target.
    pub fn requires_targets(self) -> bool {
        matches!(self, ActionKind::Charge | ActionKind::Attack)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Rush => "rush",
            ActionKind::Advance => "advance",
            ActionKind::Hold => "hold",
            ActionKind::Charge => "charge",
            ActionKind::Attack => "attack",
        };
        f.write_str(s)
    }
}

/// Classification of a logged game event.
///
/// The kind drives the consolidation rules: `Wound` pairs can cancel
/// within the correction window, `VpChange` pairs cancel on exact-opposite
/// deltas, everything else always appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Wound,
    Heal,
    Activation,
    Action,
    VpChange,
    RoundChange,
    Attach,
    Detach,
    Shaken,
    Destroyed,
    Deployed,
    Import,
    Objective,
    PlayerJoined,
    PlayerLeft,
    GameStarted,
    Custom,
}

/// Control state of an objective marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Neutral,
    Seized,
    Contested,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_player_id_serializes_as_plain_uuid_string() {
        // `#[serde(transparent)]` means the wire sees a bare uuid string,
        // not `{"0":"..."}`. Clients key their maps on these strings.
        let id = PlayerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn test_unit_id_round_trip() {
        let id = UnitId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: UnitId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_ids_are_distinct() {
        assert_ne!(GameId::new(), GameId::new());
    }

    // =====================================================================
    // GameCode
    // =====================================================================

    #[test]
    fn test_game_code_new_normalizes_case_and_whitespace() {
        assert_eq!(GameCode::new(" ab2xyz "), GameCode::new("AB2XYZ"));
    }

    #[test]
    fn test_game_code_generate_has_expected_length() {
        assert_eq!(GameCode::generate().as_str().len(), 6);
    }

    #[test]
    fn test_game_code_generate_avoids_ambiguous_characters() {
        // 0/O/I/1 are excluded so codes survive being read aloud.
        for _ in 0..50 {
            let code = GameCode::generate();
            for c in code.as_str().chars() {
                assert!(
                    !matches!(c, '0' | 'O' | 'I' | '1'),
                    "ambiguous character {c:?} in {code}"
                );
            }
        }
    }

    #[test]
    fn test_game_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&GameCode::new("AB2XYZ")).unwrap();
        assert_eq!(json, "\"AB2XYZ\"");
    }

    // =====================================================================
    // Domain enums — wire spellings are part of the protocol
    // =====================================================================

    #[test]
    fn test_game_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&GameStatus::Lobby).unwrap();
        assert_eq!(json, "\"lobby\"");
        let json = serde_json::to_string(&GameStatus::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }

    #[test]
    fn test_deployment_serializes_as_snake_case() {
        let json = serde_json::to_string(&Deployment::InAmbush).unwrap();
        assert_eq!(json, "\"in_ambush\"");
    }

    #[test]
    fn test_action_kind_target_requirements() {
        assert!(ActionKind::Charge.requires_targets());
        assert!(ActionKind::Attack.requires_targets());
        assert!(!ActionKind::Rush.requires_targets());
        assert!(!ActionKind::Advance.requires_targets());
        assert!(!ActionKind::Hold.requires_targets());
    }

    #[test]
    fn test_event_kind_round_trip() {
        let json = serde_json::to_string(&EventKind::VpChange).unwrap();
        assert_eq!(json, "\"vp_change\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::VpChange);
    }
}
