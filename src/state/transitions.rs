use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::{
    dao::models::RoundEntity,
    error::ServiceError,
    state::{
        AppState,
        round::Round,
        state_machine::{InvalidTransition, Plan, RoundTrigger, plan},
    },
};

/// A round loaded under its per-round lock.
///
/// Mutations are made on [`LockedRound::round`] and persisted with
/// [`LockedRound::commit`]; the lock is released when the value is dropped.
pub struct LockedRound {
    round: Round,
    _guard: OwnedMutexGuard<()>,
}

impl LockedRound {
    pub(crate) fn new(round: Round, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            round,
            _guard: guard,
        }
    }

    /// The round as last loaded or committed, plus local edits.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Mutable access for the side effects of a planned transition.
    pub fn round_mut(&mut self) -> &mut Round {
        &mut self.round
    }

    /// Look `trigger` up in the transition table for the current phase.
    pub fn plan(&self, trigger: RoundTrigger) -> Result<Plan, InvalidTransition> {
        plan(self.round.phase, trigger)
    }

    /// Move to the phase `plan` leads to.
    pub fn apply(&mut self, plan: &Plan) {
        if plan.from != plan.next_phase() {
            debug!(
                round_id = %self.round.id,
                trigger = ?plan.trigger,
                from = ?plan.from,
                to = ?plan.next_phase(),
                "round phase transition"
            );
        }
        self.round.phase = plan.next_phase();
    }

    /// Persist the round, failing if someone else saved it since it was loaded.
    pub async fn commit(&mut self, state: &AppState) -> Result<(), ServiceError> {
        self.round.updated_at = state.now();
        let saved = state
            .store()
            .save_round(RoundEntity::from(self.round.clone()))
            .await?;
        self.round.version = saved.version;
        Ok(())
    }

    /// Release the lock, keeping the final state of the round.
    pub fn into_round(self) -> Round {
        self.round
    }
}
