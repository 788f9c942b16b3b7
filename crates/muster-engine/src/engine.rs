//! `GameEngine` — the operations surface.
//!
//! Every mutation follows the same spine: load the game by code, refuse
//! it if expired, validate, mutate through the store, run the produced
//! events through consolidation, and bump the activity clock the reaper
//! watches. Broadcasting is the caller's business — the engine returns
//! records and snapshots, not messages.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use muster_protocol::{
    ActionKind, Deployment, EventId, EventKind, GameCode, GameSnapshot,
    GameStatus, ObjectiveId, ObjectiveSnapshot, ObjectiveStatus, PlayerId,
    PlayerSnapshot, SaveId, UnitId, UnitSnapshot, UnitStateSnapshot,
};
use muster_store::{
    Game, GameEvent, GameSave, Objective, Player, Store, Unit, UnitState,
};

use crate::error::EngineError;
use crate::log::{self, Disposition, PendingEvent};
use crate::unit::{self, Transition};

/// Seats in a multiplayer game.
pub const MAX_PLAYERS: usize = 2;

/// How long after expiry the event log stays readable.
pub const LOG_RETENTION: TimeDelta = TimeDelta::hours(24);

/// Default player color, a friendly blue.
const DEFAULT_COLOR: &str = "#3b82f6";

/// Rounds in a standard game.
const DEFAULT_MAX_ROUNDS: u32 = 4;

/// Join-code allocation attempts before giving up. The code space is
/// 32^6; hitting this many live collisions means something is very wrong.
const CODE_ATTEMPTS: usize = 32;

// ---------------------------------------------------------------------------
// Operation inputs
// ---------------------------------------------------------------------------

/// Inputs for creating a game.
#[derive(Debug, Clone)]
pub struct CreateGame {
    pub name: String,
    pub host_name: String,
    pub host_color: Option<String>,
    pub is_solo: bool,
}

/// A unit profile as delivered by the army-list importer (or typed in by
/// hand). The engine only consumes the importer's successful result.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub name: String,
    pub custom_name: Option<String>,
    pub quality: u8,
    pub defense: u8,
    pub size: u32,
    pub tough: u32,
    pub cost: u32,
    pub is_hero: bool,
    pub is_transport: bool,
    pub has_ambush: bool,
}

/// A partial update to one unit. Fields left `None` are untouched.
/// Applied in a fixed order (name, deployment, shaken, activation,
/// wounds) so a single patch behaves deterministically.
#[derive(Debug, Clone, Default)]
pub struct UnitPatch {
    pub custom_name: Option<String>,
    pub deployment: Option<Deployment>,
    /// Transport to embark into when `deployment` is `Embarked`.
    pub transport_id: Option<UnitId>,
    pub is_shaken: Option<bool>,
    pub is_activated: Option<bool>,
    pub wounds_delta: Option<i32>,
}

/// A partial update to one objective marker.
#[derive(Debug, Clone, Default)]
pub struct ObjectivePatch {
    pub status: Option<ObjectiveStatus>,
    /// `Some(None)` clears the controller.
    pub controlled_by: Option<Option<PlayerId>>,
}

// ---------------------------------------------------------------------------
// GameEngine
// ---------------------------------------------------------------------------

/// The rules engine, generic over its store.
pub struct GameEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for GameEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> GameEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // -- Game lifecycle ------------------------------------------------

    /// Creates a game with its host seat (and, for solo games, the
    /// opponent seat the single player drives by switching).
    pub async fn create_game(
        &self,
        req: CreateGame,
    ) -> Result<GameSnapshot, EngineError> {
        let code = self.allocate_code().await?;
        let now = Utc::now();

        let mut game = Game {
            id: muster_protocol::GameId::new(),
            code: code.clone(),
            name: req.name,
            status: GameStatus::Lobby,
            is_solo: req.is_solo,
            current_round: 0,
            max_rounds: DEFAULT_MAX_ROUNDS,
            current_player_id: None,
            created_at: now,
            last_activity_at: now,
            expired_at: None,
        };
        let host = Player {
            id: PlayerId::new(),
            game_id: game.id,
            name: req.host_name,
            color: req.host_color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            is_host: true,
            is_connected: false,
            victory_points: 0,
            starting_unit_count: 0,
            starting_points: 0,
            joined_at: now,
        };
        game.current_player_id = Some(host.id);

        self.store.insert_game(game.clone()).await?;
        self.store.insert_player(host).await?;
        if req.is_solo {
            // The second seat in a solo game is a real player row; the
            // single human flips `current_player_id` between the two.
            self.store
                .insert_player(Player {
                    id: PlayerId::new(),
                    game_id: game.id,
                    name: "Opponent".into(),
                    color: "#ef4444".into(),
                    is_host: false,
                    is_connected: false,
                    victory_points: 0,
                    starting_unit_count: 0,
                    starting_points: 0,
                    joined_at: now,
                })
                .await?;
        }

        tracing::info!(%code, solo = req.is_solo, "game created");
        self.snapshot(&code).await
    }

    /// Takes the second seat in a multiplayer lobby.
    pub async fn join_game(
        &self,
        code: &GameCode,
        name: String,
        color: Option<String>,
    ) -> Result<Player, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.is_solo {
            return Err(EngineError::conflict("solo games cannot be joined"));
        }
        if game.status != GameStatus::Lobby {
            return Err(EngineError::illegal("the game has already started"));
        }
        let players = self.store.players_for_game(game.id).await?;
        if players.len() >= MAX_PLAYERS {
            return Err(EngineError::conflict("the game is full"));
        }

        let player = Player {
            id: PlayerId::new(),
            game_id: game.id,
            name,
            color: color.unwrap_or_else(|| DEFAULT_COLOR.into()),
            is_host: false,
            is_connected: false,
            victory_points: 0,
            starting_unit_count: 0,
            starting_points: 0,
            joined_at: Utc::now(),
        };
        self.store.insert_player(player.clone()).await?;
        self.record(&game, PendingEvent {
            kind: EventKind::PlayerJoined,
            description: format!("{} joined the game", player.name),
            unit_id: None,
            player_id: Some(player.id),
            delta: None,
        })
        .await?;
        self.touch(&mut game).await?;
        tracing::info!(%code, player = %player.name, "player joined");
        Ok(player)
    }

    /// Closes the lobby and begins round one. Multiplayer needs both
    /// seats filled and armed; solo needs an army on the table.
    pub async fn start_game(
        &self,
        code: &GameCode,
    ) -> Result<Game, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::illegal("the game has already started"));
        }
        let players = self.store.players_for_game(game.id).await?;
        let units = self.store.units_for_game(game.id).await?;

        if game.is_solo {
            if units.is_empty() {
                return Err(EngineError::illegal(
                    "import an army before starting",
                ));
            }
        } else {
            if players.len() < MAX_PLAYERS {
                return Err(EngineError::illegal(
                    "waiting for a second player",
                ));
            }
            for player in &players {
                if !units.iter().any(|u| u.player_id == player.id) {
                    return Err(EngineError::illegal(format!(
                        "{} has no army yet",
                        player.name
                    )));
                }
            }
        }

        for mut player in players {
            let mine: Vec<&Unit> =
                units.iter().filter(|u| u.player_id == player.id).collect();
            player.starting_unit_count = mine.len() as u32;
            player.starting_points = mine.iter().map(|u| u.cost).sum();
            self.store.update_player(player).await?;
        }

        game.status = GameStatus::Active;
        game.current_round = 1;
        self.record(&game, PendingEvent::bare(
            EventKind::GameStarted,
            "The game began",
        ))
        .await?;
        self.touch(&mut game).await?;
        tracing::info!(%code, "game started");
        Ok(game)
    }

    /// Hands the turn marker to another seat (solo player switching).
    pub async fn set_current_player(
        &self,
        code: &GameCode,
        player_id: PlayerId,
    ) -> Result<Game, EngineError> {
        let mut game = self.mutable_game(code).await?;
        self.player_in_game(&game, player_id).await?;
        game.current_player_id = Some(player_id);
        self.touch(&mut game).await?;
        Ok(game)
    }

    // -- Armies --------------------------------------------------------

    /// Applies a successful army-list import: one batch of unit specs
    /// for one player, lobby only.
    pub async fn apply_import(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        specs: Vec<UnitSpec>,
    ) -> Result<Vec<Unit>, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::illegal(
                "armies can only be imported in the lobby",
            ));
        }
        let player = self.player_in_game(&game, player_id).await?;

        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let unit = unit_from_spec(&game, player_id, spec, None);
            self.store.insert_unit(unit.clone()).await?;
            created.push(unit);
        }
        let points: u32 = created.iter().map(|u| u.cost).sum();
        self.record(&game, PendingEvent {
            kind: EventKind::Import,
            description: format!(
                "{} imported {} unit{} ({} pts)",
                player.name,
                created.len(),
                if created.len() == 1 { "" } else { "s" },
                points
            ),
            unit_id: None,
            player_id: Some(player_id),
            delta: None,
        })
        .await?;
        self.touch(&mut game).await?;
        Ok(created)
    }

    /// Adds one unit by hand, optionally attached to an existing unit.
    pub async fn add_unit(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        spec: UnitSpec,
        attach_to: Option<UnitId>,
    ) -> Result<Unit, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::illegal(
                "units can only be added in the lobby",
            ));
        }
        let player = self.player_in_game(&game, player_id).await?;

        if let Some(parent_id) = attach_to {
            let parent = self.unit_in_game(&game, parent_id).await?;
            if !spec.is_hero {
                return Err(EngineError::illegal(
                    "only heroes can attach to a unit",
                ));
            }
            if parent.player_id != player_id {
                return Err(EngineError::illegal(
                    "cannot attach to another player's unit",
                ));
            }
            if parent.parent_unit_id.is_some() {
                return Err(EngineError::conflict(format!(
                    "'{}' is itself attached to a unit",
                    parent.display_name()
                )));
            }
        }

        let unit = unit_from_spec(&game, player_id, spec, attach_to);
        self.store.insert_unit(unit.clone()).await?;
        self.record(&game, PendingEvent {
            kind: EventKind::Custom,
            description: format!(
                "{} added '{}'",
                player.name,
                unit.display_name()
            ),
            unit_id: Some(unit.id),
            player_id: Some(player_id),
            delta: None,
        })
        .await?;
        self.touch(&mut game).await?;
        Ok(unit)
    }

    /// Removes a player's whole army, lobby only.
    pub async fn clear_units(
        &self,
        code: &GameCode,
        player_id: PlayerId,
    ) -> Result<u64, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Lobby {
            return Err(EngineError::illegal(
                "armies can only be cleared in the lobby",
            ));
        }
        let mut player = self.player_in_game(&game, player_id).await?;

        let removed = self.store.delete_units_for_player(player_id).await?;
        player.starting_unit_count = 0;
        player.starting_points = 0;
        let name = player.name.clone();
        self.store.update_player(player).await?;
        self.record(&game, PendingEvent {
            kind: EventKind::Custom,
            description: format!("{name} cleared their army"),
            unit_id: None,
            player_id: Some(player_id),
            delta: None,
        })
        .await?;
        self.touch(&mut game).await?;
        Ok(removed)
    }

    // -- Units ---------------------------------------------------------

    /// Applies a partial update to one unit, routing every field through
    /// the state machine.
    pub async fn patch_unit(
        &self,
        code: &GameCode,
        unit_id: UnitId,
        patch: UnitPatch,
    ) -> Result<Unit, EngineError> {
        let mut game = self.mutable_game(code).await?;
        let mut current = self.unit_in_game(&game, unit_id).await?;

        if let Some(name) = patch.custom_name {
            // Renames are quiet bookkeeping.
            current.custom_name =
                if name.is_empty() { None } else { Some(name) };
            self.store.update_unit(current.clone()).await?;
        }

        if let Some(deployment) = patch.deployment {
            let transport = match patch.transport_id {
                Some(id) => Some(self.unit_in_game(&game, id).await?),
                None => None,
            };
            let children = self.children_of(&game, current.id).await?;
            let transition = unit::set_deployment(
                &current,
                &children,
                deployment,
                transport.as_ref(),
            )?;
            current = self.apply_transition(&game, transition).await?;
        }

        if let Some(shaken) = patch.is_shaken {
            let children = self.children_of(&game, current.id).await?;
            let transition = unit::set_shaken(&current, &children, shaken)?;
            current = self.apply_transition(&game, transition).await?;
        }

        if let Some(activated) = patch.is_activated {
            let transition = if activated {
                let children = self.children_of(&game, current.id).await?;
                unit::activate(&current, &children)?
            } else {
                unit::deactivate(&current)?
            };
            current = self.apply_transition(&game, transition).await?;
        }

        if let Some(delta) = patch.wounds_delta {
            let children = self.children_of(&game, current.id).await?;
            let transition = unit::apply_wounds(&current, &children, delta)?;
            current = self.apply_transition(&game, transition).await?;
        }

        self.touch(&mut game).await?;
        Ok(current)
    }

    /// Logs an action for a unit. This is how a unit normally spends its
    /// activation; charge and attack must name at least one target.
    pub async fn unit_action(
        &self,
        code: &GameCode,
        unit_id: UnitId,
        action: ActionKind,
        targets: &[UnitId],
    ) -> Result<Unit, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Active {
            return Err(EngineError::illegal("the game is not in progress"));
        }
        let unit = self.unit_in_game(&game, unit_id).await?;

        let mut target_names = Vec::with_capacity(targets.len());
        for target_id in targets {
            let target = self.unit_in_game(&game, *target_id).await?;
            target_names.push(target.display_name().to_string());
        }

        let children = self.children_of(&game, unit.id).await?;
        let transition =
            unit::perform_action(&unit, &children, action, &target_names)?;
        let updated = self.apply_transition(&game, transition).await?;
        self.touch(&mut game).await?;
        Ok(updated)
    }

    /// Attaches a hero to a target unit.
    pub async fn attach_unit(
        &self,
        code: &GameCode,
        hero_id: UnitId,
        target_id: UnitId,
    ) -> Result<Unit, EngineError> {
        let mut game = self.mutable_game(code).await?;
        let hero = self.unit_in_game(&game, hero_id).await?;
        let target = self.unit_in_game(&game, target_id).await?;

        let transition = unit::attach(&hero, &target)?;
        let updated = self.apply_transition(&game, transition).await?;
        self.touch(&mut game).await?;
        Ok(updated)
    }

    /// Detaches a hero from its parent.
    pub async fn detach_unit(
        &self,
        code: &GameCode,
        hero_id: UnitId,
    ) -> Result<Unit, EngineError> {
        let mut game = self.mutable_game(code).await?;
        let hero = self.unit_in_game(&game, hero_id).await?;
        let parent_id = hero
            .parent_unit_id
            .ok_or_else(|| EngineError::illegal(format!(
                "'{}' is not attached",
                hero.display_name()
            )))?;
        let parent = self.unit_in_game(&game, parent_id).await?;

        let transition = unit::detach(&hero, &parent)?;
        let updated = self.apply_transition(&game, transition).await?;
        self.touch(&mut game).await?;
        Ok(updated)
    }

    // -- Score and rounds ----------------------------------------------

    /// Moves a player's victory points by a signed delta, floored at
    /// zero. An exact reversal of the previous change retracts its log
    /// entry instead of adding a new one.
    pub async fn vp_delta(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        delta: i32,
    ) -> Result<Player, EngineError> {
        let mut game = self.mutable_game(code).await?;
        let mut player = self.player_in_game(&game, player_id).await?;
        if delta == 0 {
            return Err(EngineError::illegal("VP delta must be non-zero"));
        }

        let old = player.victory_points;
        let new = (i64::from(old) + i64::from(delta)).max(0) as u32;
        let applied = new as i32 - old as i32;
        if applied == 0 {
            // Already at the floor; nothing happened, nothing is logged.
            return Ok(player);
        }

        player.victory_points = new;
        self.store.update_player(player.clone()).await?;
        self.record(&game, PendingEvent {
            kind: EventKind::VpChange,
            description: format!(
                "{} VP: {} -> {} ({:+})",
                player.name, old, new, applied
            ),
            unit_id: None,
            player_id: Some(player_id),
            delta: Some(applied),
        })
        .await?;
        self.touch(&mut game).await?;
        Ok(player)
    }

    /// Moves the round counter. Advancing resets every unit's activation
    /// (shaken persists) and logs the new round; stepping back retracts
    /// the most recent round entry instead of logging a compensation.
    /// Floored at round one.
    pub async fn round_delta(
        &self,
        code: &GameCode,
        delta: i32,
    ) -> Result<Game, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if game.status != GameStatus::Active {
            return Err(EngineError::illegal("the game is not in progress"));
        }
        if delta == 0 {
            return Err(EngineError::illegal("round delta must be non-zero"));
        }

        if delta > 0 {
            for _ in 0..delta {
                game.current_round += 1;
                for u in self.store.units_for_game(game.id).await? {
                    if u.state.is_activated
                        && u.state.deployment != Deployment::Destroyed
                    {
                        let mut rested = u;
                        rested.state.is_activated = false;
                        self.store.update_unit(rested).await?;
                    }
                }
                self.record(&game, PendingEvent {
                    kind: EventKind::RoundChange,
                    description: format!(
                        "Round {} begins",
                        game.current_round
                    ),
                    unit_id: None,
                    player_id: None,
                    delta: Some(1),
                })
                .await?;
            }
        } else {
            for _ in 0..delta.unsigned_abs() {
                if game.current_round <= 1 {
                    return Err(EngineError::illegal(
                        "already at round one",
                    ));
                }
                game.current_round -= 1;
                // Stepping back is a correction: the round's entry is
                // retracted rather than answered with a counter-entry.
                if let Some(event) =
                    self.store.latest_round_event(game.id).await?
                {
                    self.store.delete_event(event.id).await?;
                }
            }
        }

        self.touch(&mut game).await?;
        Ok(game)
    }

    // -- Objectives ----------------------------------------------------

    /// Places the objective markers, once per game.
    pub async fn create_objectives(
        &self,
        code: &GameCode,
        count: u32,
    ) -> Result<Vec<Objective>, EngineError> {
        let mut game = self.mutable_game(code).await?;
        if count == 0 {
            return Err(EngineError::illegal(
                "at least one objective is required",
            ));
        }
        if !self.store.objectives_for_game(game.id).await?.is_empty() {
            return Err(EngineError::conflict("objectives already placed"));
        }

        let mut markers = Vec::with_capacity(count as usize);
        for number in 1..=count {
            let objective = Objective {
                id: ObjectiveId::new(),
                game_id: game.id,
                marker_number: number,
                status: ObjectiveStatus::Neutral,
                controlled_by: None,
            };
            self.store.insert_objective(objective.clone()).await?;
            markers.push(objective);
        }
        self.record(&game, PendingEvent::bare(
            EventKind::Objective,
            format!("Placed {count} objective markers"),
        ))
        .await?;
        self.touch(&mut game).await?;
        Ok(markers)
    }

    /// Updates one objective marker.
    pub async fn patch_objective(
        &self,
        code: &GameCode,
        objective_id: ObjectiveId,
        patch: ObjectivePatch,
    ) -> Result<Objective, EngineError> {
        let mut game = self.mutable_game(code).await?;
        let mut objective = self
            .store
            .objective(objective_id)
            .await?
            .filter(|o| o.game_id == game.id)
            .ok_or(EngineError::NotFound("objective"))?;

        if let Some(controller) = patch.controlled_by {
            objective.controlled_by = controller;
        }
        if let Some(status) = patch.status {
            objective.status = status;
            let description = match status {
                ObjectiveStatus::Seized => {
                    let holder = match objective.controlled_by {
                        Some(id) => {
                            self.player_in_game(&game, id).await?.name
                        }
                        None => "nobody".into(),
                    };
                    format!(
                        "Objective {} seized by {}",
                        objective.marker_number, holder
                    )
                }
                ObjectiveStatus::Contested => format!(
                    "Objective {} contested",
                    objective.marker_number
                ),
                ObjectiveStatus::Neutral => format!(
                    "Objective {} neutralized",
                    objective.marker_number
                ),
            };
            self.record(&game, PendingEvent {
                kind: EventKind::Objective,
                description,
                unit_id: None,
                player_id: objective.controlled_by,
                delta: None,
            })
            .await?;
        }

        self.store.update_objective(objective.clone()).await?;
        self.touch(&mut game).await?;
        Ok(objective)
    }

    // -- Event log -----------------------------------------------------

    /// The full event log, oldest first. Readable until 24 h past
    /// expiry.
    pub async fn events(
        &self,
        code: &GameCode,
    ) -> Result<Vec<GameEvent>, EngineError> {
        let game = self.game(code).await?;
        self.ensure_log_readable(&game)?;
        Ok(self.store.events_for_game(game.id).await?)
    }

    /// The event log rendered as Markdown.
    pub async fn export_events(
        &self,
        code: &GameCode,
    ) -> Result<String, EngineError> {
        let game = self.game(code).await?;
        self.ensure_log_readable(&game)?;
        let events = self.store.events_for_game(game.id).await?;
        Ok(log::render_markdown(&game, &events))
    }

    /// Wipes the event log. Deliberately unguarded: it works in any game
    /// status, it is never itself logged, and it still counts as
    /// activity.
    pub async fn clear_events(
        &self,
        code: &GameCode,
    ) -> Result<u64, EngineError> {
        let mut game = self.game(code).await?;
        let removed = self.store.clear_events(game.id).await?;
        self.touch(&mut game).await?;
        tracing::debug!(%code, removed, "event log cleared");
        Ok(removed)
    }

    // -- Saves (solo) --------------------------------------------------

    /// Snapshots a solo game into a named save slot.
    pub async fn save_game(
        &self,
        code: &GameCode,
        name: String,
    ) -> Result<GameSave, EngineError> {
        let mut game = self.mutable_game(code).await?;
        self.ensure_solo(&game)?;

        let snapshot = self.snapshot(code).await?;
        let save = GameSave {
            id: SaveId::new(),
            game_id: game.id,
            name,
            saved_at: Utc::now(),
            snapshot: serde_json::to_value(&snapshot)
                .map_err(|_| EngineError::conflict("unserializable state"))?,
        };
        self.store.insert_save(save.clone()).await?;
        self.record(&game, PendingEvent::bare(
            EventKind::Custom,
            format!("Saved game as '{}'", save.name),
        ))
        .await?;
        self.touch(&mut game).await?;
        Ok(save)
    }

    /// Restores a solo game from a save slot: units, objectives, round,
    /// scores, and the turn marker all return to the saved state.
    pub async fn load_game(
        &self,
        code: &GameCode,
        save_id: SaveId,
    ) -> Result<GameSnapshot, EngineError> {
        let mut game = self.mutable_game(code).await?;
        self.ensure_solo(&game)?;
        let save = self
            .store
            .save(save_id)
            .await?
            .filter(|s| s.game_id == game.id)
            .ok_or(EngineError::NotFound("save"))?;
        let saved: GameSnapshot = serde_json::from_value(save.snapshot)
            .map_err(|_| {
                EngineError::conflict("save snapshot is unreadable")
            })?;

        self.store.delete_units_for_game(game.id).await?;
        for unit in &saved.units {
            self.store
                .insert_unit(unit_from_snapshot(game.id, unit))
                .await?;
        }
        for snap in &saved.players {
            if let Some(mut player) = self.store.player(snap.id).await? {
                player.victory_points = snap.victory_points;
                player.starting_unit_count = snap.starting_unit_count;
                player.starting_points = snap.starting_points;
                self.store.update_player(player).await?;
            }
        }
        for snap in &saved.objectives {
            if let Some(mut objective) =
                self.store.objective(snap.id).await?
            {
                objective.status = snap.status;
                objective.controlled_by = snap.controlled_by;
                self.store.update_objective(objective).await?;
            }
        }

        game.status = saved.status;
        game.current_round = saved.current_round;
        game.current_player_id = saved.current_player_id;
        self.record(&game, PendingEvent::bare(
            EventKind::Custom,
            format!("Loaded save '{}'", save.name),
        ))
        .await?;
        self.touch(&mut game).await?;
        tracing::info!(%code, save = %save.name, "game restored from save");
        self.snapshot(code).await
    }

    /// Lists a solo game's save slots, newest first.
    pub async fn list_saves(
        &self,
        code: &GameCode,
    ) -> Result<Vec<GameSave>, EngineError> {
        let game = self.game(code).await?;
        self.ensure_solo(&game)?;
        Ok(self.store.saves_for_game(game.id).await?)
    }

    // -- Reads and presence --------------------------------------------

    /// Builds the full client-visible state of a game.
    pub async fn snapshot(
        &self,
        code: &GameCode,
    ) -> Result<GameSnapshot, EngineError> {
        let game = self.game(code).await?;
        let players = self.store.players_for_game(game.id).await?;
        let units = self.store.units_for_game(game.id).await?;
        let objectives = self.store.objectives_for_game(game.id).await?;

        Ok(GameSnapshot {
            id: game.id,
            code: game.code,
            name: game.name,
            status: game.status,
            is_solo: game.is_solo,
            current_round: game.current_round,
            max_rounds: game.max_rounds,
            current_player_id: game.current_player_id,
            players: players.iter().map(player_snapshot).collect(),
            units: units.iter().map(unit_snapshot).collect(),
            objectives: objectives
                .iter()
                .map(|o| ObjectiveSnapshot {
                    id: o.id,
                    marker_number: o.marker_number,
                    status: o.status,
                    controlled_by: o.controlled_by,
                })
                .collect(),
        })
    }

    /// Flags a player's live WebSocket presence. The player must belong
    /// to the game behind `code`; a handler relaying client-supplied ids
    /// must not flip presence in someone else's game. Presence is not
    /// game activity, so the idle clock is not touched.
    pub async fn mark_connected(
        &self,
        code: &GameCode,
        player_id: PlayerId,
        connected: bool,
    ) -> Result<Player, EngineError> {
        let game = self.game(code).await?;
        let mut player = self.player_in_game(&game, player_id).await?;
        player.is_connected = connected;
        self.store.update_player(player.clone()).await?;
        Ok(player)
    }

    // -- Internals -----------------------------------------------------

    async fn allocate_code(&self) -> Result<GameCode, EngineError> {
        for _ in 0..CODE_ATTEMPTS {
            let code = GameCode::generate();
            let taken = self
                .store
                .game_by_code(&code)
                .await?
                .is_some_and(|g| !g.status.is_expired());
            if !taken {
                return Ok(code);
            }
        }
        Err(EngineError::conflict("could not allocate a join code"))
    }

    async fn game(&self, code: &GameCode) -> Result<Game, EngineError> {
        self.store
            .game_by_code(code)
            .await?
            .ok_or(EngineError::NotFound("game"))
    }

    /// Loads a game for mutation. Expired games reject everything here;
    /// [`clear_events`](Self::clear_events) is the single deliberate
    /// exception and does not come through this path.
    async fn mutable_game(
        &self,
        code: &GameCode,
    ) -> Result<Game, EngineError> {
        let game = self.game(code).await?;
        if game.status.is_expired() {
            return Err(EngineError::Expired);
        }
        Ok(game)
    }

    fn ensure_log_readable(&self, game: &Game) -> Result<(), EngineError> {
        if let Some(expired_at) = game.expired_at {
            if Utc::now() > expired_at + LOG_RETENTION {
                return Err(EngineError::Expired);
            }
        }
        Ok(())
    }

    fn ensure_solo(&self, game: &Game) -> Result<(), EngineError> {
        if !game.is_solo {
            return Err(EngineError::illegal(
                "saves are only available in solo games",
            ));
        }
        Ok(())
    }

    async fn player_in_game(
        &self,
        game: &Game,
        player_id: PlayerId,
    ) -> Result<Player, EngineError> {
        self.store
            .player(player_id)
            .await?
            .filter(|p| p.game_id == game.id)
            .ok_or(EngineError::NotFound("player"))
    }

    async fn unit_in_game(
        &self,
        game: &Game,
        unit_id: UnitId,
    ) -> Result<Unit, EngineError> {
        self.store
            .unit(unit_id)
            .await?
            .filter(|u| u.game_id == game.id)
            .ok_or(EngineError::NotFound("unit"))
    }

    async fn children_of(
        &self,
        game: &Game,
        parent: UnitId,
    ) -> Result<Vec<Unit>, EngineError> {
        Ok(self
            .store
            .units_for_game(game.id)
            .await?
            .into_iter()
            .filter(|u| u.parent_unit_id == Some(parent))
            .collect())
    }

    /// Persists a transition and records its events.
    async fn apply_transition(
        &self,
        game: &Game,
        transition: Transition,
    ) -> Result<Unit, EngineError> {
        self.store.update_unit(transition.unit.clone()).await?;
        for cascade in &transition.cascades {
            self.store.update_unit(cascade.clone()).await?;
        }
        for note in transition.notes {
            self.record(game, note).await?;
        }
        Ok(transition.unit)
    }

    /// Runs one candidate event through consolidation and applies the
    /// outcome.
    async fn record(
        &self,
        game: &Game,
        note: PendingEvent,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let prior = match note.kind {
            EventKind::Heal => match note.unit_id {
                Some(unit_id) => {
                    self.store
                        .latest_event_for_unit(game.id, unit_id)
                        .await?
                }
                None => None,
            },
            EventKind::VpChange => match note.player_id {
                Some(player_id) => {
                    self.store
                        .latest_vp_event_for_player(game.id, player_id)
                        .await?
                }
                None => None,
            },
            _ => None,
        };

        match log::consolidate(&note, prior.as_ref(), now) {
            Disposition::Append => {
                self.store
                    .insert_event(GameEvent {
                        id: EventId::new(),
                        game_id: game.id,
                        kind: note.kind,
                        description: note.description,
                        round: game.current_round,
                        player_id: note.player_id,
                        unit_id: note.unit_id,
                        delta: note.delta,
                        created_at: now,
                    })
                    .await?;
            }
            Disposition::CancelPrior(prior_id) => {
                tracing::debug!(
                    game = %game.code,
                    "correction retracted a prior log entry"
                );
                self.store.delete_event(prior_id).await?;
            }
        }
        Ok(())
    }

    async fn touch(&self, game: &mut Game) -> Result<(), EngineError> {
        game.last_activity_at = Utc::now();
        self.store.update_game(game.clone()).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record/snapshot conversions
// ---------------------------------------------------------------------------

fn unit_from_spec(
    game: &Game,
    player_id: PlayerId,
    spec: UnitSpec,
    parent: Option<UnitId>,
) -> Unit {
    let state = UnitState::fresh(spec.size, spec.tough, spec.has_ambush);
    Unit {
        id: UnitId::new(),
        game_id: game.id,
        player_id,
        name: spec.name,
        custom_name: spec.custom_name,
        quality: spec.quality,
        defense: spec.defense,
        size: spec.size,
        tough: spec.tough,
        cost: spec.cost,
        is_hero: spec.is_hero,
        is_transport: spec.is_transport,
        has_ambush: spec.has_ambush,
        parent_unit_id: parent,
        state,
    }
}

fn unit_from_snapshot(game_id: muster_protocol::GameId, snap: &UnitSnapshot) -> Unit {
    Unit {
        id: snap.id,
        game_id,
        player_id: snap.player_id,
        name: snap.name.clone(),
        custom_name: snap.custom_name.clone(),
        quality: snap.quality,
        defense: snap.defense,
        size: snap.size,
        tough: snap.tough,
        cost: snap.cost,
        is_hero: snap.is_hero,
        is_transport: snap.is_transport,
        has_ambush: snap.has_ambush,
        parent_unit_id: snap.parent_unit_id,
        state: UnitState {
            wounds_remaining: snap.state.wounds_remaining,
            models_remaining: snap.state.models_remaining,
            is_activated: snap.state.is_activated,
            is_shaken: snap.state.is_shaken,
            deployment: snap.state.deployment,
            transport_id: snap.state.transport_id,
        },
    }
}

fn unit_snapshot(unit: &Unit) -> UnitSnapshot {
    UnitSnapshot {
        id: unit.id,
        player_id: unit.player_id,
        name: unit.name.clone(),
        custom_name: unit.custom_name.clone(),
        quality: unit.quality,
        defense: unit.defense,
        size: unit.size,
        tough: unit.tough,
        cost: unit.cost,
        is_hero: unit.is_hero,
        is_transport: unit.is_transport,
        has_ambush: unit.has_ambush,
        parent_unit_id: unit.parent_unit_id,
        state: UnitStateSnapshot {
            wounds_remaining: unit.state.wounds_remaining,
            models_remaining: unit.state.models_remaining,
            is_activated: unit.state.is_activated,
            is_shaken: unit.state.is_shaken,
            deployment: unit.state.deployment,
            transport_id: unit.state.transport_id,
        },
    }
}

/// Client-visible view of one player, also used for `player_joined`
/// broadcasts.
pub fn player_snapshot(player: &Player) -> PlayerSnapshot {
    PlayerSnapshot {
        id: player.id,
        name: player.name.clone(),
        color: player.color.clone(),
        is_host: player.is_host,
        is_connected: player.is_connected,
        victory_points: player.victory_points,
        starting_unit_count: player.starting_unit_count,
        starting_points: player.starting_points,
    }
}

// =========================================================================
// Tests
// =========================================================================
