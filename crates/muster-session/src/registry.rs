//! Rooms and broadcast.
//!
//! One room per live game, one bounded channel per connection. The
//! registry holds the send halves; each connection's writer task drains
//! the receive half into its WebSocket. Fan-out never awaits under the
//! lock: sender handles are cloned out first, then sent to with
//! `try_send`, and connections whose channel has closed are pruned on
//! the next pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use muster_protocol::{GameCode, PlayerId, ServerMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound queue depth per connection. A client that falls this many
/// messages behind is cut; on reconnect it receives a fresh full state.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Registry-unique handle for one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ConnectionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct ConnectionHandle {
    sender: mpsc::Sender<ServerMessage>,
    /// Set once the client identifies itself with a `join` message.
    player_id: Option<PlayerId>,
}

#[derive(Default)]
struct Room {
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

/// All live rooms. Rooms appear when their first connection registers
/// and vanish when their last one leaves.
#[derive(Default)]
pub struct Registry {
    rooms: Mutex<HashMap<GameCode, Room>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a game's room, creating the room if needed.
    /// Returns the connection's id, a sender for direct replies to this
    /// connection, and the receive half its writer task drains.
    pub fn register(
        &self,
        code: &GameCode,
    ) -> (
        ConnectionId,
        mpsc::Sender<ServerMessage>,
        mpsc::Receiver<ServerMessage>,
    ) {
        let (sender, receiver) = mpsc::channel(DEFAULT_CHANNEL_SIZE);
        let id = ConnectionId::next();
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.entry(code.clone()).or_default().connections.insert(
            id,
            ConnectionHandle {
                sender: sender.clone(),
                player_id: None,
            },
        );
        tracing::debug!(%code, %id, "connection registered");
        (id, sender, receiver)
    }

    /// Records which player a connection speaks for.
    pub fn bind_player(
        &self,
        code: &GameCode,
        id: ConnectionId,
        player_id: PlayerId,
    ) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = rooms
            .get_mut(code)
            .and_then(|room| room.connections.get_mut(&id))
        {
            handle.player_id = Some(player_id);
        }
    }

    /// Removes a connection. Idempotent; returns the player it was bound
    /// to, if any, so the caller can mark them disconnected. Empty rooms
    /// are dropped.
    pub fn unregister(
        &self,
        code: &GameCode,
        id: ConnectionId,
    ) -> Option<PlayerId> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let room = rooms.get_mut(code)?;
        let player_id =
            room.connections.remove(&id).and_then(|h| h.player_id);
        if room.connections.is_empty() {
            rooms.remove(code);
            tracing::debug!(%code, "room closed, last connection left");
        }
        player_id
    }

    /// Sends a message to every connection in a room. Returns how many
    /// queues accepted it.
    pub fn broadcast(&self, code: &GameCode, message: &ServerMessage) -> usize {
        self.fan_out(code, None, message)
    }

    /// Sends a message to every connection in a room except one, for
    /// echoes the originator already has.
    pub fn broadcast_except(
        &self,
        code: &GameCode,
        skip: ConnectionId,
        message: &ServerMessage,
    ) -> usize {
        self.fan_out(code, Some(skip), message)
    }

    fn fan_out(
        &self,
        code: &GameCode,
        skip: Option<ConnectionId>,
        message: &ServerMessage,
    ) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> = {
            let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            let Some(room) = rooms.get(code) else {
                return 0;
            };
            room.connections
                .iter()
                .filter(|(id, _)| Some(**id) != skip)
                .map(|(id, handle)| (*id, handle.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    // A consumer this far behind is as good as gone. Cut
                    // it; the client reconnects and pulls a fresh state.
                    tracing::warn!(%code, %id, "outbound queue full, cutting connection");
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut rooms =
                self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(room) = rooms.get_mut(code) {
                for id in dead {
                    room.connections.remove(&id);
                    tracing::debug!(%code, %id, "pruned closed connection");
                }
                if room.connections.is_empty() {
                    rooms.remove(code);
                }
            }
        }
        delivered
    }

    /// Players with a live, bound connection in a room.
    pub fn connected_players(&self, code: &GameCode) -> Vec<PlayerId> {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .get(code)
            .map(|room| {
                room.connections
                    .values()
                    .filter_map(|h| h.player_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops a room outright, closing every connection's channel. The
    /// reaper calls this when it expires a game. Returns how many
    /// connections were cut.
    pub fn close_room(&self, code: &GameCode) -> usize {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .remove(code)
            .map(|room| room.connections.len())
            .unwrap_or(0)
    }

    /// Live connections in a room.
    pub fn room_size(&self, code: &GameCode) -> usize {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.get(code).map(|r| r.connections.len()).unwrap_or(0)
    }
}

// =========================================================================
// Tests
// =========================================================================
