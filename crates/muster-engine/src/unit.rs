//! The unit state machine.
//!
//! Pure functions from a unit (plus its attached children) to a
//! [`Transition`]: the updated records and the events the change should
//! produce. Nothing here touches storage or time; the engine persists the
//! records and runs the events through consolidation.
//!
//! State space per unit:
//!
//! ```text
//!   deployment:  normal ─ in_ambush ─ embarked ─ destroyed (terminal)
//!   flags:       is_activated × is_shaken
//! ```
//!
//! Cascades are explicit. Destroying a parent returns the detached
//! children inside the transition; acting with a parent returns the
//! children with `is_activated` set. There is no hidden recursion — what
//! you get back is everything that changed.

use muster_protocol::{ActionKind, Deployment, EventKind};
use muster_store::Unit;
use thiserror::Error;

use crate::error::EngineError;
use crate::log::PendingEvent;

/// A transition that did not validate.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("illegal transition: {0}")]
    Illegal(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Illegal(reason) => {
                EngineError::IllegalTransition(reason)
            }
            TransitionError::Conflict(reason) => EngineError::Conflict(reason),
        }
    }
}

fn illegal(reason: impl Into<String>) -> TransitionError {
    TransitionError::Illegal(reason.into())
}

/// The result of one state-machine step: every record that changed and
/// every event the change produces, in order.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The unit the operation was aimed at.
    pub unit: Unit,
    /// Other units changed as a side effect (detached or activated
    /// children).
    pub cascades: Vec<Unit>,
    /// Events to record. May be empty for quiet changes.
    pub notes: Vec<PendingEvent>,
}

impl Transition {
    fn quiet(unit: Unit) -> Self {
        Self {
            unit,
            cascades: Vec::new(),
            notes: Vec::new(),
        }
    }
}

fn ensure_alive(unit: &Unit) -> Result<(), TransitionError> {
    if unit.state.deployment == Deployment::Destroyed {
        return Err(illegal(format!(
            "'{}' is destroyed",
            unit.display_name()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wounds
// ---------------------------------------------------------------------------

/// Applies a signed wound delta. Negative is damage, positive is healing.
///
/// Damage runs the cascade: wounds tick down on the current model, a
/// model is removed at zero and the counter resets to `tough`, and the
/// unit is destroyed when the last model goes — which also detaches every
/// attached child, each with its own detach event. Overkill damage past
/// destruction is discarded.
///
/// Healing is the exact inverse and stops at full strength; it can never
/// resurrect a destroyed unit because destroyed is terminal.
pub fn apply_wounds(
    unit: &Unit,
    children: &[Unit],
    delta: i32,
) -> Result<Transition, TransitionError> {
    ensure_alive(unit)?;
    if delta == 0 {
        return Err(illegal("wound delta must be non-zero"));
    }

    let mut updated = unit.clone();
    if delta < 0 {
        let destroyed = damage(&mut updated, delta.unsigned_abs());
        let mut transition = Transition {
            notes: vec![PendingEvent {
                kind: EventKind::Wound,
                description: format!(
                    "'{}' took {} wound{}",
                    unit.display_name(),
                    delta.unsigned_abs(),
                    plural(delta.unsigned_abs())
                ),
                unit_id: Some(unit.id),
                player_id: Some(unit.player_id),
                delta: Some(delta),
            }],
            unit: updated,
            cascades: Vec::new(),
        };
        if destroyed {
            destroy_cascade(&mut transition, children);
        }
        Ok(transition)
    } else {
        let healed = heal(&mut updated, delta.unsigned_abs());
        let mut transition = Transition::quiet(updated);
        if healed > 0 {
            transition.notes.push(PendingEvent {
                kind: EventKind::Heal,
                description: format!(
                    "'{}' healed {} wound{}",
                    unit.display_name(),
                    healed,
                    plural(healed)
                ),
                unit_id: Some(unit.id),
                player_id: Some(unit.player_id),
                delta: Some(healed as i32),
            });
        }
        Ok(transition)
    }
}

/// Ticks damage through the model cascade. Returns true when the unit is
/// destroyed.
fn damage(unit: &mut Unit, amount: u32) -> bool {
    let per_model = unit.tough.max(1);
    for _ in 0..amount {
        if unit.state.wounds_remaining > 1 {
            unit.state.wounds_remaining -= 1;
        } else if unit.state.models_remaining > 1 {
            unit.state.models_remaining -= 1;
            unit.state.wounds_remaining = per_model;
        } else {
            unit.state.models_remaining = 0;
            unit.state.wounds_remaining = 0;
            unit.state.deployment = Deployment::Destroyed;
            return true;
        }
    }
    false
}

/// Inverse of [`damage`]; returns how many wounds actually healed.
fn heal(unit: &mut Unit, amount: u32) -> u32 {
    let per_model = unit.tough.max(1);
    let full_size = unit.size.max(1);
    let mut healed = 0;
    for _ in 0..amount {
        if unit.state.wounds_remaining < per_model {
            unit.state.wounds_remaining += 1;
        } else if unit.state.models_remaining < full_size {
            unit.state.models_remaining += 1;
            unit.state.wounds_remaining = 1;
        } else {
            break;
        }
        healed += 1;
    }
    healed
}

/// Marks the transition's unit destroyed side effects: detach every live
/// child, one detach event each. A child of a shaken parent stays shaken
/// after detaching.
fn destroy_cascade(transition: &mut Transition, children: &[Unit]) {
    let parent_shaken = transition.unit.state.is_shaken;
    transition.notes.push(PendingEvent {
        kind: EventKind::Destroyed,
        description: format!(
            "'{}' was destroyed",
            transition.unit.display_name()
        ),
        unit_id: Some(transition.unit.id),
        player_id: Some(transition.unit.player_id),
        delta: None,
    });
    for child in children {
        if child.state.deployment == Deployment::Destroyed {
            continue;
        }
        let mut freed = child.clone();
        freed.parent_unit_id = None;
        if parent_shaken {
            freed.state.is_shaken = true;
        }
        transition.notes.push(PendingEvent {
            kind: EventKind::Detach,
            description: format!(
                "'{}' detached from '{}' (unit destroyed)",
                freed.display_name(),
                transition.unit.display_name()
            ),
            unit_id: Some(freed.id),
            player_id: Some(freed.player_id),
            delta: None,
        });
        transition.cascades.push(freed);
    }
}

// ---------------------------------------------------------------------------
// Shaken
// ---------------------------------------------------------------------------

/// Sets the shaken flag. Always logged when it changes — corrections to a
/// morale state are worth seeing in the record. Attached children mirror
/// the flag silently; the log entry already names the combined unit.
pub fn set_shaken(
    unit: &Unit,
    children: &[Unit],
    shaken: bool,
) -> Result<Transition, TransitionError> {
    ensure_alive(unit)?;
    if unit.state.is_shaken == shaken {
        return Ok(Transition::quiet(unit.clone()));
    }

    let mut updated = unit.clone();
    updated.state.is_shaken = shaken;
    let description = if shaken {
        format!("'{}' is shaken", unit.display_name())
    } else {
        format!("'{}' rallied", unit.display_name())
    };
    let mut transition = Transition {
        unit: updated,
        cascades: Vec::new(),
        notes: vec![PendingEvent {
            kind: EventKind::Shaken,
            description,
            unit_id: Some(unit.id),
            player_id: Some(unit.player_id),
            delta: None,
        }],
    };
    for child in children {
        if child.state.deployment == Deployment::Destroyed
            || child.state.is_shaken == shaken
        {
            continue;
        }
        let mut mirrored = child.clone();
        mirrored.state.is_shaken = shaken;
        transition.cascades.push(mirrored);
    }
    Ok(transition)
}

// ---------------------------------------------------------------------------
// Activation and actions
// ---------------------------------------------------------------------------

fn ensure_can_act(unit: &Unit) -> Result<(), TransitionError> {
    ensure_alive(unit)?;
    if unit.state.deployment == Deployment::Embarked {
        return Err(illegal(format!(
            "'{}' is embarked and cannot act on its own",
            unit.display_name()
        )));
    }
    if unit.parent_unit_id.is_some() {
        return Err(illegal(format!(
            "'{}' is attached and activates with its parent",
            unit.display_name()
        )));
    }
    if unit.state.is_activated {
        return Err(illegal(format!(
            "'{}' has already activated this round",
            unit.display_name()
        )));
    }
    Ok(())
}

/// Activates a unit without an action (the scoreboard's "mark used"
/// toggle). Attached children activate with it, each with its own
/// activation event.
pub fn activate(
    unit: &Unit,
    children: &[Unit],
) -> Result<Transition, TransitionError> {
    ensure_can_act(unit)?;

    let mut updated = unit.clone();
    updated.state.is_activated = true;
    let mut transition = Transition {
        unit: updated,
        cascades: Vec::new(),
        notes: vec![PendingEvent {
            kind: EventKind::Activation,
            description: format!("'{}' activated", unit.display_name()),
            unit_id: Some(unit.id),
            player_id: Some(unit.player_id),
            delta: None,
        }],
    };
    for child in live_unactivated(children) {
        let mut activated = child.clone();
        activated.state.is_activated = true;
        transition.notes.push(PendingEvent {
            kind: EventKind::Activation,
            description: format!(
                "'{}' activated with '{}'",
                activated.display_name(),
                unit.display_name()
            ),
            unit_id: Some(activated.id),
            player_id: Some(activated.player_id),
            delta: None,
        });
        transition.cascades.push(activated);
    }
    Ok(transition)
}

/// Clears the activation flag. Quiet: the log records what happened in
/// the game, and "mis-tapped the used toggle" is not that.
pub fn deactivate(unit: &Unit) -> Result<Transition, TransitionError> {
    ensure_alive(unit)?;
    let mut updated = unit.clone();
    updated.state.is_activated = false;
    Ok(Transition::quiet(updated))
}

/// Performs an action, which is how a unit normally spends its
/// activation. One action event is logged for the parent; attached
/// children are marked activated as a side effect without log entries of
/// their own.
///
/// `target_names` are the display names of already-validated targets;
/// charge and attack require at least one.
pub fn perform_action(
    unit: &Unit,
    children: &[Unit],
    action: ActionKind,
    target_names: &[String],
) -> Result<Transition, TransitionError> {
    ensure_can_act(unit)?;
    if action.requires_targets() && target_names.is_empty() {
        return Err(illegal(format!(
            "{action} requires at least one target"
        )));
    }

    let verb = match action {
        ActionKind::Rush => "rushed",
        ActionKind::Advance => "advanced",
        ActionKind::Hold => "held position",
        ActionKind::Charge => "charged",
        ActionKind::Attack => "attacked",
    };
    let description = if target_names.is_empty() {
        format!("'{}' {}", unit.display_name(), verb)
    } else {
        let targets: Vec<String> =
            target_names.iter().map(|n| format!("'{n}'")).collect();
        format!(
            "'{}' {} {}",
            unit.display_name(),
            verb,
            targets.join(", ")
        )
    };

    let mut updated = unit.clone();
    updated.state.is_activated = true;
    let mut transition = Transition {
        unit: updated,
        cascades: Vec::new(),
        notes: vec![PendingEvent {
            kind: EventKind::Action,
            description,
            unit_id: Some(unit.id),
            player_id: Some(unit.player_id),
            delta: None,
        }],
    };
    for child in live_unactivated(children) {
        let mut activated = child.clone();
        activated.state.is_activated = true;
        transition.cascades.push(activated);
    }
    Ok(transition)
}

fn live_unactivated<'a>(
    children: &'a [Unit],
) -> impl Iterator<Item = &'a Unit> {
    children.iter().filter(|c| {
        c.state.deployment != Deployment::Destroyed && !c.state.is_activated
    })
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// Attaches a hero to a unit. Depth is capped at one: the hero must have
/// no parent, and the target must be a parentless non-hero of the same
/// player.
pub fn attach(hero: &Unit, target: &Unit) -> Result<Transition, TransitionError> {
    ensure_alive(hero)?;
    ensure_alive(target)?;
    if !hero.is_hero {
        return Err(illegal(format!(
            "only heroes can attach; '{}' is not one",
            hero.display_name()
        )));
    }
    if hero.parent_unit_id.is_some() {
        return Err(illegal(format!(
            "'{}' is already attached",
            hero.display_name()
        )));
    }
    if target.is_hero {
        return Err(illegal(format!(
            "cannot attach to another hero ('{}')",
            target.display_name()
        )));
    }
    if target.player_id != hero.player_id {
        return Err(illegal(
            "cannot attach to another player's unit".to_string(),
        ));
    }
    if target.parent_unit_id.is_some() {
        return Err(TransitionError::Conflict(format!(
            "'{}' is itself attached to a unit",
            target.display_name()
        )));
    }

    let mut updated = hero.clone();
    updated.parent_unit_id = Some(target.id);
    Ok(Transition {
        unit: updated,
        cascades: Vec::new(),
        notes: vec![PendingEvent {
            kind: EventKind::Attach,
            description: format!(
                "'{}' attached to '{}'",
                hero.display_name(),
                target.display_name()
            ),
            unit_id: Some(hero.id),
            player_id: Some(hero.player_id),
            delta: None,
        }],
    })
}

/// Detaches a hero from its parent.
pub fn detach(hero: &Unit, parent: &Unit) -> Result<Transition, TransitionError> {
    ensure_alive(hero)?;
    if hero.parent_unit_id != Some(parent.id) {
        return Err(illegal(format!(
            "'{}' is not attached to '{}'",
            hero.display_name(),
            parent.display_name()
        )));
    }

    let mut updated = hero.clone();
    updated.parent_unit_id = None;
    Ok(Transition {
        unit: updated,
        cascades: Vec::new(),
        notes: vec![PendingEvent {
            kind: EventKind::Detach,
            description: format!(
                "'{}' detached from '{}'",
                hero.display_name(),
                parent.display_name()
            ),
            unit_id: Some(hero.id),
            player_id: Some(hero.player_id),
            delta: None,
        }],
    })
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Moves a unit between deployment states. `transport` must be supplied
/// when embarking. Setting `Destroyed` is the manual remove-from-play
/// path and runs the same detach cascade as lethal damage.
pub fn set_deployment(
    unit: &Unit,
    children: &[Unit],
    new: Deployment,
    transport: Option<&Unit>,
) -> Result<Transition, TransitionError> {
    ensure_alive(unit)?;
    let current = unit.state.deployment;
    if current == new {
        return Ok(Transition::quiet(unit.clone()));
    }

    let mut updated = unit.clone();
    match new {
        Deployment::Destroyed => {
            updated.state.deployment = Deployment::Destroyed;
            updated.state.models_remaining = 0;
            updated.state.wounds_remaining = 0;
            let mut transition = Transition::quiet(updated);
            destroy_cascade(&mut transition, children);
            return Ok(transition);
        }
        Deployment::Embarked => {
            let transport = transport.ok_or_else(|| {
                illegal("embarking requires a transport".to_string())
            })?;
            if !transport.is_transport {
                return Err(illegal(format!(
                    "'{}' is not a transport",
                    transport.display_name()
                )));
            }
            if transport.state.deployment == Deployment::Destroyed {
                return Err(illegal(format!(
                    "'{}' is destroyed",
                    transport.display_name()
                )));
            }
            if transport.player_id != unit.player_id {
                return Err(illegal(
                    "cannot embark into another player's transport"
                        .to_string(),
                ));
            }
            updated.state.deployment = Deployment::Embarked;
            updated.state.transport_id = Some(transport.id);
            let description = format!(
                "'{}' embarked into '{}'",
                unit.display_name(),
                transport.display_name()
            );
            return Ok(deployment_transition(updated, description));
        }
        Deployment::Normal => {
            updated.state.deployment = Deployment::Normal;
            updated.state.transport_id = None;
            let description = match current {
                Deployment::InAmbush => format!(
                    "'{}' deployed from ambush",
                    unit.display_name()
                ),
                Deployment::Embarked => {
                    format!("'{}' disembarked", unit.display_name())
                }
                _ => unreachable!("current == new handled above"),
            };
            return Ok(deployment_transition(updated, description));
        }
        Deployment::InAmbush => {
            if current == Deployment::Embarked {
                return Err(illegal(format!(
                    "'{}' must disembark before entering ambush reserve",
                    unit.display_name()
                )));
            }
            updated.state.deployment = Deployment::InAmbush;
            let description = format!(
                "'{}' moved into ambush reserve",
                unit.display_name()
            );
            return Ok(deployment_transition(updated, description));
        }
    }
}

fn deployment_transition(unit: Unit, description: String) -> Transition {
    let note = PendingEvent {
        kind: EventKind::Deployed,
        description,
        unit_id: Some(unit.id),
        player_id: Some(unit.player_id),
        delta: None,
    };
    Transition {
        unit,
        cascades: Vec::new(),
        notes: vec![note],
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}

// =========================================================================
// Tests
// =========================================================================
