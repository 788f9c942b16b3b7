//! The engine's error taxonomy.

use muster_store::StoreError;
use thiserror::Error;

/// Everything an operation can refuse with.
///
/// The four domain variants map one-to-one onto client-visible failures;
/// store errors pass through transparently because the engine has nothing
/// to add to them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced game, player, unit, objective, or save does not
    /// exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation is not valid from the current state. The reason is
    /// shown to the player verbatim.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// The game was reaped for inactivity and no longer accepts this
    /// operation.
    #[error("game has expired")]
    Expired,

    /// The operation collides with a structural invariant (full lobby,
    /// attach chains, duplicate objectives).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage failure, passed through.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn illegal(reason: impl Into<String>) -> Self {
        EngineError::IllegalTransition(reason.into())
    }

    pub(crate) fn conflict(reason: impl Into<String>) -> Self {
        EngineError::Conflict(reason.into())
    }
}
