//! Storage errors.

use muster_protocol::GameCode;
use thiserror::Error;

/// Failures at the persistence boundary.
///
/// Lookups that simply find nothing return `Ok(None)`; these variants are
/// for writes that cannot be honored.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An update referenced a row that no longer exists.
    #[error("{entity} not found")]
    Missing { entity: &'static str },

    /// A game insert collided with an active game's join code.
    #[error("join code {0} already in use")]
    DuplicateCode(GameCode),
}
