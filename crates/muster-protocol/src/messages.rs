//! WebSocket wire messages.
//!
//! Both directions use internally tagged JSON with snake_case tags:
//!
//! ```text
//! client → server   {"type":"join","player_id":"…"}
//!                   {"type":"state_update","data":{…}}
//!                   {"type":"request_state"}
//!                   {"type":"ping"}
//!
//! server → client   {"type":"state","data":{…}}
//!                   {"type":"player_joined","player":{…}}
//!                   {"type":"round_advanced","round":2}
//!                   {"type":"pong"}  …
//! ```
//!
//! Unknown inbound types deserialize to an error; the handler answers with
//! an `error` message and keeps the connection open.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::snapshot::{GameSnapshot, PlayerSnapshot};
use crate::types::PlayerId;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client may send on the game socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a player seat. Until a connection joins it
    /// receives broadcasts anonymously but is not counted as a player.
    Join { player_id: PlayerId },

    /// Opaque UI-sync payload, rebroadcast verbatim to the other
    /// connections in the room. Persistence happens through the
    /// operations API, not here.
    StateUpdate { data: serde_json::Value },

    /// Ask for a fresh full-state snapshot.
    RequestState,

    /// Keep-alive probe; answered with `pong`.
    Ping,
}

impl ClientMessage {
    /// Parses an inbound text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full game state, sent on connect and on `request_state`.
    State { data: GameSnapshot },

    /// Rebroadcast of a client's `state_update`, or a change notification
    /// after an operation mutated the game.
    StateUpdate { data: serde_json::Value },

    /// A player's connection identified itself.
    PlayerJoined { player: PlayerSnapshot },

    /// A player's connection went away.
    PlayerLeft { player_id: PlayerId },

    /// The lobby closed and round 1 began.
    GameStarted,

    /// The round counter moved.
    RoundAdvanced { round: u32 },

    /// Answer to `ping`.
    Pong,

    /// The previous inbound message could not be honored.
    Error { message: String },
}

impl ServerMessage {
    /// Serializes for an outbound text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Convenience constructor for error replies.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
