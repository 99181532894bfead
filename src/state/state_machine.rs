use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle states of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Scheduled; participants may join and details may be edited.
    Upcoming,
    /// Started; scores are being collected.
    InProgress,
    /// Scores are sealed. Immutable history apart from audited corrections.
    Finalized,
    /// Tombstoned by an explicit delete.
    Deleted,
}

/// Everything that can act on a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundTrigger {
    /// A user joins or changes their response.
    Join,
    /// A scheduled reminder fires.
    Remind,
    /// The scheduled (or manual) start fires.
    Begin,
    /// A participant submits a score.
    SubmitScore,
    /// Scores are sealed, either on completion or on demand.
    Finalize,
    /// Round details are edited.
    Edit,
    /// The round is deleted.
    Delete,
    /// A finalized score is corrected.
    CorrectScore,
}

/// Result of looking a trigger up in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Apply the trigger's side effects and move to the given phase.
    Advance(RoundPhase),
    /// Apply the trigger's side effects without changing phase.
    Stay,
    /// Duplicate or late trigger: do nothing and report success.
    Ignore,
}

/// Error returned when a trigger is not allowed from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Phase the round was in.
    pub from: RoundPhase,
    /// Trigger that was refused.
    pub trigger: RoundTrigger,
}

/// A validated transition, ready to be applied to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Phase the round is in.
    pub from: RoundPhase,
    /// Trigger being applied.
    pub trigger: RoundTrigger,
    /// Table outcome.
    pub transition: Transition,
}

impl Plan {
    /// Phase the round ends up in once the plan is applied.
    pub fn next_phase(&self) -> RoundPhase {
        match self.transition {
            Transition::Advance(next) => next,
            Transition::Stay | Transition::Ignore => self.from,
        }
    }

    /// Whether the plan is an idempotent no-op.
    pub fn is_ignored(&self) -> bool {
        self.transition == Transition::Ignore
    }
}

/// The single authoritative transition table of the round lifecycle.
pub fn plan(from: RoundPhase, trigger: RoundTrigger) -> Result<Plan, InvalidTransition> {
    use RoundPhase::*;
    use RoundTrigger::*;
    use Transition::*;

    let transition = match (from, trigger) {
        (Upcoming, Join | Remind | SubmitScore | Edit) => Stay,
        (Upcoming, Begin) => Advance(InProgress),
        (Upcoming, Delete) => Advance(Deleted),

        (InProgress, Join | SubmitScore) => Stay,
        (InProgress, Remind | Begin) => Ignore,
        (InProgress, Finalize) => Advance(Finalized),
        (InProgress, Delete) => Advance(Deleted),

        (Finalized, CorrectScore) => Stay,
        (Finalized, Remind | Begin | Finalize) => Ignore,

        (Deleted, Remind | Begin | Delete) => Ignore,

        (from, trigger) => return Err(InvalidTransition { from, trigger }),
    };

    Ok(Plan {
        from,
        trigger,
        transition,
    })
}
