//! The `Store` trait — everything the engine asks of persistence.

use std::future::Future;

use muster_protocol::{
    EventId, GameCode, GameId, ObjectiveId, PlayerId, SaveId, UnitId,
};

use crate::error::StoreError;
use crate::records::{Game, GameEvent, GameSave, Objective, Player, Unit};

/// The persistence boundary.
///
/// Queries are phrased in domain terms so a backing database can serve
/// them with one indexed lookup each. Implementations must keep each
/// game's events in insertion order; the `latest_*` queries and
/// [`events_for_game`](Store::events_for_game) are defined against that
/// order.
///
/// Lookups return `Ok(None)` when nothing matches. Updates of vanished
/// rows fail with [`StoreError::Missing`] — with a single writer that
/// means a reaper or clear raced the operation, and the engine surfaces
/// it rather than resurrecting the row.
///
/// Methods are spelled as `-> impl Future<…> + Send` rather than
/// `async fn` so the futures stay `Send`: connection handlers generic
/// over the store run under `tokio::spawn`. Implementations can still
/// write plain `async fn`.
pub trait Store: Send + Sync + 'static {
    // -- Games ---------------------------------------------------------

    /// Inserts a game. Fails with [`StoreError::DuplicateCode`] if the
    /// join code collides with a non-expired game; expired games do not
    /// reserve their codes.
    fn insert_game(
        &self,
        game: Game,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Resolves a join code. Prefers a non-expired match; falls back to
    /// the most recently created expired one so post-expiry log reads
    /// still resolve.
    fn game_by_code(
        &self,
        code: &GameCode,
    ) -> impl Future<Output = Result<Option<Game>, StoreError>> + Send;

    fn game_by_id(
        &self,
        id: GameId,
    ) -> impl Future<Output = Result<Option<Game>, StoreError>> + Send;

    fn update_game(
        &self,
        game: Game,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All games, for the reaper's sweep snapshot.
    fn list_games(
        &self,
    ) -> impl Future<Output = Result<Vec<Game>, StoreError>> + Send;

    // -- Players -------------------------------------------------------

    fn insert_player(
        &self,
        player: Player,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn player(
        &self,
        id: PlayerId,
    ) -> impl Future<Output = Result<Option<Player>, StoreError>> + Send;

    /// Players of one game, in join order.
    fn players_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<Player>, StoreError>> + Send;

    fn update_player(
        &self,
        player: Player,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- Units ---------------------------------------------------------

    fn insert_unit(
        &self,
        unit: Unit,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn unit(
        &self,
        id: UnitId,
    ) -> impl Future<Output = Result<Option<Unit>, StoreError>> + Send;

    /// Units of one game, in insertion order.
    fn units_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<Unit>, StoreError>> + Send;

    fn update_unit(
        &self,
        unit: Unit,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes every unit a player owns; returns how many went.
    fn delete_units_for_player(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Removes every unit in a game (solo-save restore path).
    fn delete_units_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // -- Objectives ----------------------------------------------------

    fn insert_objective(
        &self,
        objective: Objective,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn objective(
        &self,
        id: ObjectiveId,
    ) -> impl Future<Output = Result<Option<Objective>, StoreError>> + Send;

    /// Objectives of one game, by marker number.
    fn objectives_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<Objective>, StoreError>> + Send;

    fn update_objective(
        &self,
        objective: Objective,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- Events --------------------------------------------------------

    fn insert_event(
        &self,
        event: GameEvent,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes one event (the consolidation rules retract corrected
    /// entries this way). Deleting an already-gone event is a no-op.
    fn delete_event(
        &self,
        id: EventId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Full log of one game, oldest first.
    fn events_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<GameEvent>, StoreError>> + Send;

    /// The most recent event that references the given unit, any kind.
    /// This is the "prior event" input to wound consolidation.
    fn latest_event_for_unit(
        &self,
        game: GameId,
        unit: UnitId,
    ) -> impl Future<Output = Result<Option<GameEvent>, StoreError>> + Send;

    /// The most recent VP-change event for the given player.
    fn latest_vp_event_for_player(
        &self,
        game: GameId,
        player: PlayerId,
    ) -> impl Future<Output = Result<Option<GameEvent>, StoreError>> + Send;

    /// The most recent round-change event in the game.
    fn latest_round_event(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Option<GameEvent>, StoreError>> + Send;

    /// Wipes the log; returns how many events went.
    fn clear_events(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // -- Saves ---------------------------------------------------------

    fn insert_save(
        &self,
        save: GameSave,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn save(
        &self,
        id: SaveId,
    ) -> impl Future<Output = Result<Option<GameSave>, StoreError>> + Send;

    /// Save slots of one game, newest first.
    fn saves_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<GameSave>, StoreError>> + Send;
}
