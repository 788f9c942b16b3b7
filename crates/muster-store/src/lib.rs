//! Persistence boundary for Muster.
//!
//! The engine never touches storage directly; it goes through the
//! [`Store`] trait. This crate provides:
//!
//! - **Records** ([`Game`], [`Player`], [`Unit`], [`GameEvent`], …) — the
//!   rows the engine reads and writes.
//! - **The [`Store`] trait** — the full query surface the engine needs,
//!   phrased as domain queries (`latest_event_for_unit`) rather than
//!   generic CRUD, so a SQL implementation can push them down as indexed
//!   lookups.
//! - **[`MemStore`]** — an in-memory implementation behind a single async
//!   mutex. It backs every test and is a perfectly good store for a
//!   single-node deployment; games are small and human-paced.
//!
//! Writes are serialized through the store; the engine's read-validate-
//! write sequences rely on last-writer-wins, which is an accepted outcome
//! for a scoreboard driven by people tapping buttons.

mod error;
mod memory;
mod records;
mod store;

pub use error::StoreError;
pub use memory::MemStore;
pub use records::{Game, GameEvent, GameSave, Objective, Player, Unit, UnitState};
pub use store::Store;
