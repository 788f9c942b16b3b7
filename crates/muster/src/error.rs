//! Top-level error type for the server crate.

use muster_engine::EngineError;
use muster_protocol::ProtocolError;
use thiserror::Error;

/// Everything that can go wrong between a TCP accept and a game
/// operation. The engine and protocol layers keep their own taxonomies;
/// this just gives the server one `?`-friendly type.
#[derive(Debug, Error)]
pub enum MusterError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
