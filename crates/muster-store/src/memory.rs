//! In-memory store.
//!
//! A single async mutex around plain vectors and maps. Every test runs
//! against this, and a single-node deployment can too — a game holds a
//! few dozen units and a few hundred events, all driven at human speed.

use std::collections::HashMap;

use muster_protocol::{
    EventId, EventKind, GameCode, GameId, ObjectiveId, PlayerId, SaveId,
    UnitId,
};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::records::{Game, GameEvent, GameSave, Objective, Player, Unit};
use crate::store::Store;

#[derive(Default)]
struct Inner {
    games: HashMap<GameId, Game>,
    /// Insertion order doubles as join order / table order / log order
    /// for the per-game list queries.
    players: Vec<Player>,
    units: Vec<Unit>,
    objectives: Vec<Objective>,
    events: Vec<GameEvent>,
    saves: Vec<GameSave>,
}

/// An in-memory [`Store`].
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    // -- Games ---------------------------------------------------------

    async fn insert_game(&self, game: Game) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let clash = inner.games.values().any(|g| {
            g.code == game.code && !g.status.is_expired() && g.id != game.id
        });
        if clash {
            return Err(StoreError::DuplicateCode(game.code));
        }
        inner.games.insert(game.id, game);
        Ok(())
    }

    async fn game_by_code(
        &self,
        code: &GameCode,
    ) -> Result<Option<Game>, StoreError> {
        let inner = self.inner.lock().await;
        let live = inner
            .games
            .values()
            .find(|g| &g.code == code && !g.status.is_expired());
        if let Some(game) = live {
            return Ok(Some(game.clone()));
        }
        // Expired games keep answering by code for post-expiry log reads.
        let expired = inner
            .games
            .values()
            .filter(|g| &g.code == code)
            .max_by_key(|g| g.created_at);
        Ok(expired.cloned())
    }

    async fn game_by_id(&self, id: GameId) -> Result<Option<Game>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.games.get(&id).cloned())
    }

    async fn update_game(&self, game: Game) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.games.get_mut(&game.id) {
            Some(slot) => {
                *slot = game;
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "game" }),
        }
    }

    async fn list_games(&self) -> Result<Vec<Game>, StoreError> {
        let inner = self.inner.lock().await;
        let mut games: Vec<Game> = inner.games.values().cloned().collect();
        games.sort_by_key(|g| g.created_at);
        Ok(games)
    }

    // -- Players -------------------------------------------------------

    async fn insert_player(&self, player: Player) -> Result<(), StoreError> {
        self.inner.lock().await.players.push(player);
        Ok(())
    }

    async fn player(&self, id: PlayerId) -> Result<Option<Player>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.players.iter().find(|p| p.id == id).cloned())
    }

    async fn players_for_game(
        &self,
        game: GameId,
    ) -> Result<Vec<Player>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .players
            .iter()
            .filter(|p| p.game_id == game)
            .cloned()
            .collect())
    }

    async fn update_player(&self, player: Player) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.players.iter_mut().find(|p| p.id == player.id) {
            Some(slot) => {
                *slot = player;
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "player" }),
        }
    }

    // -- Units ---------------------------------------------------------

    async fn insert_unit(&self, unit: Unit) -> Result<(), StoreError> {
        self.inner.lock().await.units.push(unit);
        Ok(())
    }

    async fn unit(&self, id: UnitId) -> Result<Option<Unit>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.units.iter().find(|u| u.id == id).cloned())
    }

    async fn units_for_game(
        &self,
        game: GameId,
    ) -> Result<Vec<Unit>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .units
            .iter()
            .filter(|u| u.game_id == game)
            .cloned()
            .collect())
    }

    async fn update_unit(&self, unit: Unit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.units.iter_mut().find(|u| u.id == unit.id) {
            Some(slot) => {
                *slot = unit;
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "unit" }),
        }
    }

    async fn delete_units_for_player(
        &self,
        player: PlayerId,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.units.len();
        inner.units.retain(|u| u.player_id != player);
        Ok((before - inner.units.len()) as u64)
    }

    async fn delete_units_for_game(
        &self,
        game: GameId,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.units.len();
        inner.units.retain(|u| u.game_id != game);
        Ok((before - inner.units.len()) as u64)
    }

    // -- Objectives ----------------------------------------------------

    async fn insert_objective(
        &self,
        objective: Objective,
    ) -> Result<(), StoreError> {
        self.inner.lock().await.objectives.push(objective);
        Ok(())
    }

    async fn objective(
        &self,
        id: ObjectiveId,
    ) -> Result<Option<Objective>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.objectives.iter().find(|o| o.id == id).cloned())
    }

    async fn objectives_for_game(
        &self,
        game: GameId,
    ) -> Result<Vec<Objective>, StoreError> {
        let inner = self.inner.lock().await;
        let mut markers: Vec<Objective> = inner
            .objectives
            .iter()
            .filter(|o| o.game_id == game)
            .cloned()
            .collect();
        markers.sort_by_key(|o| o.marker_number);
        Ok(markers)
    }

    async fn update_objective(
        &self,
        objective: Objective,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.objectives.iter_mut().find(|o| o.id == objective.id) {
            Some(slot) => {
                *slot = objective;
                Ok(())
            }
            None => Err(StoreError::Missing { entity: "objective" }),
        }
    }

    // -- Events --------------------------------------------------------

    async fn insert_event(&self, event: GameEvent) -> Result<(), StoreError> {
        self.inner.lock().await.events.push(event);
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.events.retain(|e| e.id != id);
        Ok(())
    }

    async fn events_for_game(
        &self,
        game: GameId,
    ) -> Result<Vec<GameEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.game_id == game)
            .cloned()
            .collect())
    }

    async fn latest_event_for_unit(
        &self,
        game: GameId,
        unit: UnitId,
    ) -> Result<Option<GameEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|e| e.game_id == game && e.unit_id == Some(unit))
            .cloned())
    }

    async fn latest_vp_event_for_player(
        &self,
        game: GameId,
        player: PlayerId,
    ) -> Result<Option<GameEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|e| {
                e.game_id == game
                    && e.kind == EventKind::VpChange
                    && e.player_id == Some(player)
            })
            .cloned())
    }

    async fn latest_round_event(
        &self,
        game: GameId,
    ) -> Result<Option<GameEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|e| e.game_id == game && e.kind == EventKind::RoundChange)
            .cloned())
    }

    async fn clear_events(&self, game: GameId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.events.len();
        inner.events.retain(|e| e.game_id != game);
        Ok((before - inner.events.len()) as u64)
    }

    // -- Saves ---------------------------------------------------------

    async fn insert_save(&self, save: GameSave) -> Result<(), StoreError> {
        self.inner.lock().await.saves.push(save);
        Ok(())
    }

    async fn save(&self, id: SaveId) -> Result<Option<GameSave>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.saves.iter().find(|s| s.id == id).cloned())
    }

    async fn saves_for_game(
        &self,
        game: GameId,
    ) -> Result<Vec<GameSave>, StoreError> {
        let inner = self.inner.lock().await;
        let mut saves: Vec<GameSave> = inner
            .saves
            .iter()
            .filter(|s| s.game_id == game)
            .cloned()
            .collect();
        saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(saves)
    }
}

// =========================================================================
// Tests
// =========================================================================
