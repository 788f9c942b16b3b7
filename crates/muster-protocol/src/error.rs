//! Protocol-level errors.

use thiserror::Error;

/// What can go wrong turning wire messages into JSON and back.
///
/// Encode failures are server bugs (our own types failed to serialize);
/// decode failures are expected whenever a client sends garbage, and the
/// handler answers them with an `error` message instead of dropping the
/// connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message failed to serialize to JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Incoming text was not a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}
