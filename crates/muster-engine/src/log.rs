//! The event log: consolidation rules and export rendering.
//!
//! Players mis-tap. The log engine keeps the record honest without
//! littering it with corrections:
//!
//! - A wound entered and undone within [`WOUND_CORRECTION_WINDOW`] is a
//!   correction — the original entry is retracted and nothing new is
//!   logged. Past the window it is treated as in-game healing and both
//!   entries stand.
//! - A VP decrement that exactly cancels the most recent VP change for
//!   that player retracts it, with no time window: VP only moves when a
//!   human taps a button, so an exact opposite is always a correction.
//!   Partial cancellation is a real adjustment and is logged as such.
//!
//! Both rules are one pure decision, [`consolidate`], over the candidate
//! entry, the single most recent prior entry that could cancel it, and
//! the current time. The caller fetches that prior entry and applies the
//! returned [`Disposition`].

use chrono::{DateTime, TimeDelta, Utc};
use muster_protocol::{EventId, EventKind, PlayerId, UnitId};
use muster_store::{Game, GameEvent};

/// How long after a wound entry an exact opposite still counts as a
/// correction rather than healing.
pub const WOUND_CORRECTION_WINDOW: TimeDelta = TimeDelta::seconds(30);

/// An event the engine wants to record, before it has a row identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub kind: EventKind,
    pub description: String,
    pub unit_id: Option<UnitId>,
    pub player_id: Option<PlayerId>,
    pub delta: Option<i32>,
}

impl PendingEvent {
    /// An event with no actor ids and no delta.
    pub fn bare(kind: EventKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            unit_id: None,
            player_id: None,
            delta: None,
        }
    }
}

/// What to do with a candidate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Record the candidate.
    Append,
    /// The candidate corrects the given prior event: delete that event
    /// and record nothing.
    CancelPrior(EventId),
}

/// Decides whether a candidate event consolidates against the most recent
/// prior event that could cancel it.
///
/// For a heal candidate, `prior` must be the most recent event of any
/// kind referencing the same unit — an intervening action or shaken
/// toggle breaks the correction chain. For a VP candidate, `prior` is the
/// most recent VP change for the same player. Everything else appends
/// unconditionally; shaken toggles in particular are always logged.
pub fn consolidate(
    candidate: &PendingEvent,
    prior: Option<&GameEvent>,
    now: DateTime<Utc>,
) -> Disposition {
    let Some(prior) = prior else {
        return Disposition::Append;
    };

    match candidate.kind {
        EventKind::Heal => {
            let exact_opposite = prior.kind == EventKind::Wound
                && prior.unit_id == candidate.unit_id
                && opposing(prior.delta, candidate.delta);
            let in_window =
                now.signed_duration_since(prior.created_at)
                    <= WOUND_CORRECTION_WINDOW;
            if exact_opposite && in_window {
                Disposition::CancelPrior(prior.id)
            } else {
                Disposition::Append
            }
        }
        EventKind::VpChange if candidate.delta.is_some_and(|d| d < 0) => {
            let exact_opposite = prior.kind == EventKind::VpChange
                && prior.player_id == candidate.player_id
                && opposing(prior.delta, candidate.delta);
            if exact_opposite {
                Disposition::CancelPrior(prior.id)
            } else {
                Disposition::Append
            }
        }
        _ => Disposition::Append,
    }
}

/// Two deltas that sum to zero, both present and non-zero.
fn opposing(a: Option<i32>, b: Option<i32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a != 0 && a == -b,
        _ => false,
    }
}

/// Renders a game's full log as Markdown, oldest first.
pub fn render_markdown(game: &Game, events: &[GameEvent]) -> String {
    let mut out = format!("# Game Log: {}\n", game.name);
    for event in events {
        out.push_str(&format!(
            "\n### Round {} - {}\n{}\n",
            event.round,
            event.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            event.description,
        ));
    }
    out
}

// =========================================================================
// Tests
// =========================================================================
