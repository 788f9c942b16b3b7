//! The reaper: a background sweep that expires idle games.
//!
//! Multiplayer games expire after an hour with no activity and nobody
//! connected; solo games get thirty days, because a campaign between
//! evenings is the point of solo mode. Expiry flips the game to
//! `expired`, stamps `expired_at`, frees the join code for reuse, and
//! closes the game's room. The event log stays readable for another day
//! after that.
//!
//! The sweep is a pure function of the clock ([`Reaper::sweep_at`]); the
//! [`run`](Reaper::run) loop just feeds it `Utc::now()` on an interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use muster_protocol::{GameId, GameStatus};
use muster_session::Registry;
use muster_store::{Game, Store};

/// Sweep timing and idle thresholds.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often the sweep runs.
    pub interval: Duration,
    /// Idle threshold for multiplayer games with nobody connected.
    pub multiplayer_idle: TimeDelta,
    /// Idle threshold for solo games.
    pub solo_idle: TimeDelta,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            multiplayer_idle: TimeDelta::hours(1),
            solo_idle: TimeDelta::days(30),
        }
    }
}

/// The expiry sweep.
pub struct Reaper<S> {
    store: Arc<S>,
    registry: Arc<Registry>,
    config: ReaperConfig,
}

impl<S: Store> Reaper<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<Registry>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Runs the sweep forever. Spawn this next to the server.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        loop {
            ticker.tick().await;
            self.sweep_at(Utc::now()).await;
        }
    }

    /// One pass over every game at the given instant. Returns the ids of
    /// the games expired this pass. A failure on one game is logged and
    /// does not stop the sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<GameId> {
        let games = match self.store.list_games().await {
            Ok(games) => games,
            Err(err) => {
                tracing::warn!(error = %err, "reaper could not list games");
                return Vec::new();
            }
        };

        let mut expired = Vec::new();
        for game in games {
            if game.status.is_expired() || !self.is_stale(&game, now) {
                continue;
            }
            match self.expire(game, now).await {
                Ok(id) => expired.push(id),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to expire game");
                }
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "reaper expired idle games");
        }
        expired
    }

    fn is_stale(&self, game: &Game, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(game.last_activity_at);
        if game.is_solo {
            idle > self.config.solo_idle
        } else {
            idle > self.config.multiplayer_idle
                && self.registry.connected_players(&game.code).is_empty()
                && self.registry.room_size(&game.code) == 0
        }
    }

    async fn expire(
        &self,
        mut game: Game,
        now: DateTime<Utc>,
    ) -> Result<GameId, muster_store::StoreError> {
        game.status = GameStatus::Expired;
        game.expired_at = Some(now);
        self.store.update_game(game.clone()).await?;
        let cut = self.registry.close_room(&game.code);
        tracing::info!(code = %game.code, connections_cut = cut, "game expired");
        Ok(game.id)
    }
}

// =========================================================================
// Tests
// =========================================================================
