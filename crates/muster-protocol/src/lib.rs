//! Shared vocabulary for Muster.
//!
//! This crate defines everything the other layers need to talk about the
//! same game without depending on each other:
//!
//! - **Identity** ([`GameId`], [`PlayerId`], [`UnitId`], [`GameCode`], …) —
//!   typed ids and the human-facing join code.
//! - **Domain enums** ([`GameStatus`], [`Deployment`], [`ActionKind`],
//!   [`EventKind`], [`ObjectiveStatus`]) — the closed sets of states the
//!   engine transitions between. These are wire-visible, so their serde
//!   representations are part of the protocol.
//! - **Wire messages** ([`ClientMessage`], [`ServerMessage`]) — the JSON
//!   messages exchanged over the game WebSocket.
//! - **Snapshots** ([`GameSnapshot`] and friends) — the full-state payload
//!   sent on connect and used for solo-game saves.
//!
//! The protocol layer knows nothing about storage or connections; it only
//! fixes the shapes that travel between them.

mod error;
mod messages;
mod snapshot;
mod types;

pub use error::ProtocolError;
pub use messages::{ClientMessage, ServerMessage};
pub use snapshot::{
    GameSnapshot, ObjectiveSnapshot, PlayerSnapshot, UnitSnapshot,
    UnitStateSnapshot,
};
pub use types::{
    ActionKind, Deployment, EventId, EventKind, GameCode, GameId, GameStatus,
    ObjectiveId, ObjectiveStatus, PlayerId, SaveId, UnitId,
};
