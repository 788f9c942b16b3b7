//! `GameService` — mutate, then tell the room.
//!
//! The engine returns records; the service turns each successful
//! mutation into a broadcast so every connection at the table sees the
//! new state without polling. Operations that fail broadcast nothing.

use std::sync::Arc;

use muster_engine::{
    player_snapshot, CreateGame, EngineError, GameEngine, ObjectivePatch,
    UnitPatch, UnitSpec,
};
use muster_protocol::{
    ActionKind, GameCode, GameSnapshot, ObjectiveId, PlayerId, SaveId,
    ServerMessage, UnitId,
};
use muster_session::Registry;
use muster_store::{Game, Objective, Player, Store, Unit};

/// The engine plus the registry, glued by a broadcast-after-mutate rule.
pub struct GameService<S> {
    engine: GameEngine<S>,
    registry: Arc<Registry>,
}

impl<S: Store> GameService<S> {
    pub fn new(engine: GameEngine<S>, registry: Arc<Registry>) -> Self {
        Self { engine, registry }
    }

    /// Direct access for operations with no broadcast side (reads,
    /// presence, saves, the log).
    pub fn engine(&self) -> &GameEngine<S> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // -- Lifecycle -----------------------------------------------------

    /// No room exists yet, so creation broadcasts nothing.
    pub async fn create_game(
        &self,
        req: CreateGame,
    ) -> Result<GameSnapshot, EngineError> {
        self.engine.create_game(req).await
    }

    pub async fn join_game(
        &self,
        code: &GameCode,
        name: String,
        color: Option<String>,
    ) -> Result<Player, EngineError> {
        let player = self.engine.join_game(code, name, color).await?;
        self.registry.broadcast(code, &ServerMessage::PlayerJoined {
            player: player_snapshot(&player),
        });
        self.push_state(code).await;
        Ok(player)
    }

    pub async fn start_game(
        &self,
        code: &GameCode,
    ) -> Result<Game, EngineError> {
        let game = self.engine.start_game(code).await?;
        self.registry.broadcast(code, &ServerMessage::GameStarted);
        self.push_state(code).await;
        Ok(game)
    }

    pub async fn set_current_player(
        &self,
        code: &GameCode,
        player_id: PlayerId,
    ) -> Result<Game, EngineError> {
        let game = self.engine.set_current_player(code, player_id).await?;
        self.push_state(code).await;
        Ok(game)
    }

    // -- Armies and units ----------------------------------------------

    pub async fn apply_import(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        specs: Vec<UnitSpec>,
    ) -> Result<Vec<Unit>, EngineError> {
        let units = self.engine.apply_import(code, player_id, specs).await?;
        self.push_state(code).await;
        Ok(units)
    }

    pub async fn add_unit(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        spec: UnitSpec,
        attach_to: Option<UnitId>,
    ) -> Result<Unit, EngineError> {
        let unit = self
            .engine
            .add_unit(code, player_id, spec, attach_to)
            .await?;
        self.push_state(code).await;
        Ok(unit)
    }

    pub async fn clear_units(
        &self,
        code: &GameCode,
        player_id: PlayerId,
    ) -> Result<u64, EngineError> {
        let removed = self.engine.clear_units(code, player_id).await?;
        self.push_state(code).await;
        Ok(removed)
    }

    pub async fn patch_unit(
        &self,
        code: &GameCode,
        unit_id: UnitId,
        patch: UnitPatch,
    ) -> Result<Unit, EngineError> {
        let unit = self.engine.patch_unit(code, unit_id, patch).await?;
        self.push_state(code).await;
        Ok(unit)
    }

    pub async fn unit_action(
        &self,
        code: &GameCode,
        unit_id: UnitId,
        action: ActionKind,
        targets: &[UnitId],
    ) -> Result<Unit, EngineError> {
        let unit = self
            .engine
            .unit_action(code, unit_id, action, targets)
            .await?;
        self.push_state(code).await;
        Ok(unit)
    }

    pub async fn attach_unit(
        &self,
        code: &GameCode,
        hero_id: UnitId,
        target_id: UnitId,
    ) -> Result<Unit, EngineError> {
        let unit = self.engine.attach_unit(code, hero_id, target_id).await?;
        self.push_state(code).await;
        Ok(unit)
    }

    pub async fn detach_unit(
        &self,
        code: &GameCode,
        hero_id: UnitId,
    ) -> Result<Unit, EngineError> {
        let unit = self.engine.detach_unit(code, hero_id).await?;
        self.push_state(code).await;
        Ok(unit)
    }

    // -- Score, rounds, objectives -------------------------------------

    pub async fn vp_delta(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        delta: i32,
    ) -> Result<Player, EngineError> {
        let player = self.engine.vp_delta(code, player_id, delta).await?;
        self.push_state(code).await;
        Ok(player)
    }

    pub async fn round_delta(
        &self,
        code: &GameCode,
        delta: i32,
    ) -> Result<Game, EngineError> {
        let game = self.engine.round_delta(code, delta).await?;
        self.registry.broadcast(code, &ServerMessage::RoundAdvanced {
            round: game.current_round,
        });
        self.push_state(code).await;
        Ok(game)
    }

    pub async fn create_objectives(
        &self,
        code: &GameCode,
        count: u32,
    ) -> Result<Vec<Objective>, EngineError> {
        let objectives = self.engine.create_objectives(code, count).await?;
        self.push_state(code).await;
        Ok(objectives)
    }

    pub async fn patch_objective(
        &self,
        code: &GameCode,
        objective_id: ObjectiveId,
        patch: ObjectivePatch,
    ) -> Result<Objective, EngineError> {
        let objective = self
            .engine
            .patch_objective(code, objective_id, patch)
            .await?;
        self.push_state(code).await;
        Ok(objective)
    }

    // -- Saves ---------------------------------------------------------

    pub async fn load_game(
        &self,
        code: &GameCode,
        save_id: SaveId,
    ) -> Result<GameSnapshot, EngineError> {
        let snapshot = self.engine.load_game(code, save_id).await?;
        self.registry.broadcast(code, &ServerMessage::State {
            data: snapshot.clone(),
        });
        Ok(snapshot)
    }

    // -- Internals -----------------------------------------------------

    /// Pushes a fresh snapshot to the room. A snapshot that cannot be
    /// built (the game expired under us) is logged, not propagated: the
    /// mutation itself already succeeded.
    async fn push_state(&self, code: &GameCode) {
        match self.engine.snapshot(code).await {
            Ok(data) => {
                self.registry.broadcast(code, &ServerMessage::State { data });
            }
            Err(err) => {
                tracing::debug!(%code, error = %err, "state push skipped");
            }
        }
    }
}
