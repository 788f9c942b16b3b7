//! Game rules for Muster.
//!
//! Three layers, pure to impure:
//!
//! - [`unit`] — the unit state machine. Pure functions from a unit (plus
//!   any attached children) to a [`Transition`]: the updated records and
//!   the full list of events the change produces. Cascades — a destroyed
//!   parent shedding its heroes, an acting parent activating its children
//!   — are explicit entries in the returned transition, never hidden
//!   recursion.
//! - [`log`] — the event log. [`log::consolidate`] is a pure decision
//!   over (candidate, most recent prior event, now) that implements the
//!   correction rules: a wound undone within thirty seconds retracts the
//!   original entry instead of logging a compensating one, and a VP
//!   decrement that exactly cancels the last VP change retracts it with
//!   no window at all.
//! - [`engine`] — [`GameEngine`], which wires the two onto a [`Store`]:
//!   every operation loads the game by code, refuses expired games,
//!   validates, mutates, records events, and bumps the activity clock.
//!
//! [`Store`]: muster_store::Store

pub mod engine;
mod error;
pub mod log;
pub mod unit;

pub use engine::{
    player_snapshot, CreateGame, GameEngine, ObjectivePatch, UnitPatch,
    UnitSpec,
};
pub use error::EngineError;
pub use log::{Disposition, PendingEvent, WOUND_CORRECTION_WINDOW};
pub use unit::Transition;
