//! Round lifecycle orchestration.
//!
//! Every operation that mutates a round runs under the round's lock and goes
//! through the transition table in [`crate::state::state_machine`]. Scheduled
//! events (reminders, start) are tolerated in every phase and turn into
//! no-ops when the round moved on, was deleted, or was rescheduled.

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    error::ServiceError,
    scheduler::{self, ScheduledKind, ScheduledRoundEvent},
    services::{completion, finalization, lifecycle_events},
    state::{
        LockedRound, SharedState,
        round::{
            Participant, ParticipantChange, ParticipantResponse, Round, RoundDraft, RoundId,
            RoundUpdate, Score, ScoreCorrection, TagNumber, UserId,
        },
        state_machine::{self, RoundPhase, RoundTrigger},
    },
};

/// Result alias for orchestrator operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// How an idempotent trigger was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The trigger took effect.
    Applied,
    /// The round does not exist (any more).
    Missing,
    /// The event was scheduled for a start instant the round no longer has.
    Stale,
    /// Duplicate or late trigger for the current phase.
    Ignored,
}

/// How a finalize request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Scores were sealed by this call.
    Finalized,
    /// The round was already finalized; nothing changed.
    AlreadyFinalized,
}

/// Result of a join.
#[derive(Debug)]
pub struct JoinReceipt {
    /// Participant as committed.
    pub participant: Participant,
    /// What the join changed.
    pub change: ParticipantChange,
    /// Whether the join completed the round (a decline can).
    pub finalized: bool,
    /// Background tag resolution, when one was started.
    pub tag_resolution: Option<JoinHandle<Option<TagNumber>>>,
}

/// Result of a score submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReceipt {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub score: Score,
    /// Whether this submission completed the round.
    pub finalized: bool,
}

/// Persist a new upcoming round and schedule its reminders and start.
///
/// If scheduling fails the round is removed again and the transport error is returned.
pub async fn create_round(state: &SharedState, draft: RoundDraft) -> ServiceResult<Round> {
    let now = state.now();
    validate_draft(&draft, now)?;

    let round = Round::from(state.store().create_round(draft.into_entity(now)).await?);

    if let Err(err) = scheduler::schedule_round(
        state.scheduler(),
        round.id,
        round.start_time,
        state.config().reminders,
    )
    .await
    {
        warn!(round_id = %round.id, error = %err, "failed to schedule round events; rolling back");
        if let Err(remove_err) = state.store().remove_round(round.id).await {
            error!(round_id = %round.id, error = %remove_err, "failed to roll back unscheduled round");
        }
        return Err(err.into());
    }

    info!(
        round_id = %round.id,
        title = %round.title,
        start_time = %round.start_time,
        "round created"
    );
    lifecycle_events::publish_round_created(state, &round).await;
    Ok(round)
}

/// Add a participant, or update the response of an existing one.
///
/// The ranking tag is resolved in the background once the join is committed;
/// a lookup failure leaves the participant unranked.
pub async fn join_round(
    state: &SharedState,
    round_id: RoundId,
    user_id: UserId,
    response: ParticipantResponse,
) -> ServiceResult<JoinReceipt> {
    if user_id.as_str().trim().is_empty() {
        return Err(ServiceError::InvalidInput("user id must not be empty".into()));
    }

    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::Join)?;
    let change = locked
        .round_mut()
        .upsert_participant(user_id.clone(), response);

    if change == ParticipantChange::Unchanged {
        debug!(round_id = %round_id, user_id = %user_id, "repeated join; nothing to do");
        return Ok(JoinReceipt {
            participant: participant_or_new(locked.round(), &user_id, response),
            change,
            finalized: false,
            tag_resolution: None,
        });
    }

    locked.apply(&plan);
    let in_progress = locked.round().phase == RoundPhase::InProgress;
    if in_progress && response.expects_score() {
        locked.round_mut().seed_scores();
    }
    locked.commit(state).await?;

    let previous = match change {
        ParticipantChange::ResponseChanged { previous } => Some(previous),
        ParticipantChange::Added | ParticipantChange::Unchanged => None,
    };
    info!(round_id = %round_id, user_id = %user_id, ?response, "participant joined");
    lifecycle_events::publish_participant_joined(
        state,
        locked.round(),
        &user_id,
        response,
        previous,
    )
    .await;

    let finalized = in_progress && completion::round_is_complete(locked.round());
    if finalized {
        finalize_locked(state, &mut locked).await?;
    }

    let participant = participant_or_new(locked.round(), &user_id, response);
    drop(locked);

    let tag_resolution = (!finalized && participant.tag_number.is_none())
        .then(|| spawn_tag_resolution(state.clone(), round_id, user_id));

    Ok(JoinReceipt {
        participant,
        change,
        finalized,
        tag_resolution,
    })
}

/// Resolve a participant's ranking tag and merge it into the round.
///
/// Never fails: timeouts and unknown users leave the tag unset.
pub async fn resolve_participant_tag(
    state: &SharedState,
    round_id: RoundId,
    user_id: UserId,
) -> Option<TagNumber> {
    let tag = match state.tags().tag_number(&user_id).await {
        Ok(Some(tag)) => tag,
        Ok(None) => {
            info!(round_id = %round_id, user_id = %user_id, "no ranking tag for participant");
            return None;
        }
        Err(err) => {
            warn!(
                round_id = %round_id,
                user_id = %user_id,
                error = %err,
                "tag resolution failed; participant stays unranked"
            );
            return None;
        }
    };

    match merge_tag(state, round_id, &user_id, tag).await {
        Ok(true) => Some(tag),
        Ok(false) => None,
        Err(err) => {
            warn!(round_id = %round_id, user_id = %user_id, error = %err, "failed to store resolved tag");
            None
        }
    }
}

fn spawn_tag_resolution(
    state: SharedState,
    round_id: RoundId,
    user_id: UserId,
) -> JoinHandle<Option<TagNumber>> {
    tokio::spawn(async move { resolve_participant_tag(&state, round_id, user_id).await })
}

async fn merge_tag(
    state: &SharedState,
    round_id: RoundId,
    user_id: &UserId,
    tag: TagNumber,
) -> ServiceResult<bool> {
    let Some(mut locked) = state.lock_round(round_id).await? else {
        return Ok(false);
    };
    if matches!(
        locked.round().phase,
        RoundPhase::Finalized | RoundPhase::Deleted
    ) {
        debug!(round_id = %round_id, user_id = %user_id, phase = ?locked.round().phase, "tag arrived after the round closed");
        return Ok(false);
    }
    if !locked.round_mut().set_tag(user_id, tag) {
        return Ok(false);
    }

    locked.commit(state).await?;
    debug!(round_id = %round_id, user_id = %user_id, %tag, "ranking tag resolved");
    lifecycle_events::publish_tag_resolved(state, locked.round(), user_id, tag).await;
    Ok(true)
}

/// Handle a delayed event coming back from the scheduler.
pub async fn handle_scheduled_event(
    state: &SharedState,
    event: ScheduledRoundEvent,
) -> ServiceResult<EventOutcome> {
    match event.kind {
        ScheduledKind::Start => start_round(state, event.round_id, Some(&event)).await,
        _ => send_reminder(state, &event).await,
    }
}

/// Move an upcoming round to in-progress and seed zero scores.
pub async fn begin_round(state: &SharedState, round_id: RoundId) -> ServiceResult<EventOutcome> {
    start_round(state, round_id, None).await
}

/// Shared body of the scheduled and manual starts.
///
/// A scheduled trigger is dropped when it was computed for another start instant.
async fn start_round(
    state: &SharedState,
    round_id: RoundId,
    scheduled: Option<&ScheduledRoundEvent>,
) -> ServiceResult<EventOutcome> {
    let Some(mut locked) = load_round(state, round_id).await? else {
        debug!(round_id = %round_id, "start fired for unknown round");
        return Ok(EventOutcome::Missing);
    };
    if is_stale(&locked, scheduled) {
        return Ok(EventOutcome::Stale);
    }

    let plan = locked.plan(RoundTrigger::Begin)?;
    if plan.is_ignored() {
        debug!(round_id = %round_id, phase = ?plan.from, "start ignored");
        return Ok(EventOutcome::Ignored);
    }

    locked.apply(&plan);
    let seeded = locked.round_mut().seed_scores();
    locked.commit(state).await?;

    info!(round_id = %round_id, seeded, "round started");
    lifecycle_events::publish_round_started(state, locked.round()).await;

    if completion::round_is_complete(locked.round()) {
        finalize_locked(state, &mut locked).await?;
    }
    Ok(EventOutcome::Applied)
}

/// Start a round immediately, with the same guards as the scheduled start.
pub async fn start_round_now(state: &SharedState, round_id: RoundId) -> ServiceResult<Round> {
    match begin_round(state, round_id).await? {
        EventOutcome::Missing => Err(not_found(round_id)),
        _ => get_round(state, round_id).await,
    }
}

/// Notify participants ahead of the start.
pub async fn send_reminder(
    state: &SharedState,
    event: &ScheduledRoundEvent,
) -> ServiceResult<EventOutcome> {
    let Some(locked) = load_round(state, event.round_id).await? else {
        return Ok(EventOutcome::Missing);
    };
    if is_stale(&locked, Some(event)) {
        return Ok(EventOutcome::Stale);
    }

    let plan = locked.plan(RoundTrigger::Remind)?;
    if plan.is_ignored() {
        debug!(round_id = %event.round_id, kind = ?event.kind, phase = ?plan.from, "reminder ignored");
        return Ok(EventOutcome::Ignored);
    }

    lifecycle_events::publish_reminder(state, locked.round(), event.kind).await;
    Ok(EventOutcome::Applied)
}

/// Record a participant's score and finalize when it completes the round.
pub async fn submit_score(
    state: &SharedState,
    round_id: RoundId,
    user_id: UserId,
    score: Score,
) -> ServiceResult<ScoreReceipt> {
    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::SubmitScore)?;

    let participant = locked.round().participant(&user_id).ok_or_else(|| {
        ServiceError::NotFound(format!("participant {user_id} in round {round_id}"))
    })?;
    if !participant.response.expects_score() {
        return Err(ServiceError::InvalidInput(format!(
            "participant {user_id} declined round {round_id}"
        )));
    }

    locked.apply(&plan);
    locked.round_mut().record_score(&user_id, score);
    locked.commit(state).await?;
    lifecycle_events::publish_score_submitted(state, locked.round(), &user_id, score).await;

    let complete = locked.round().phase == RoundPhase::InProgress
        && completion::round_is_complete(locked.round());
    if complete {
        finalize_locked(state, &mut locked).await?;
    } else {
        debug!(
            round_id = %round_id,
            missing = completion::missing_scores(&locked.round().participants, &locked.round().pending_scores).len(),
            "waiting for more scores"
        );
    }

    Ok(ScoreReceipt {
        round_id,
        user_id,
        score,
        finalized: complete,
    })
}

/// Seal the scores of an in-progress round now.
pub async fn finalize_round(state: &SharedState, round_id: RoundId) -> ServiceResult<FinalizeOutcome> {
    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::Finalize)?;
    if plan.is_ignored() {
        return Ok(FinalizeOutcome::AlreadyFinalized);
    }

    finalize_locked(state, &mut locked).await?;
    Ok(FinalizeOutcome::Finalized)
}

/// Seal pending scores, commit FINALIZED, then publish downstream.
async fn finalize_locked(state: &SharedState, locked: &mut LockedRound) -> ServiceResult<()> {
    let plan = locked.plan(RoundTrigger::Finalize)?;
    if !plan.is_ignored() {
        locked.round_mut().seal_scores();
        locked.apply(&plan);
        locked.commit(state).await?;
        info!(
            round_id = %locked.round().id,
            scores = locked.round().finalized_scores.len(),
            "round finalized"
        );
    }

    publish_finalization(state, locked).await
}

/// Publish the finalized round unless that already succeeded, then record it.
async fn publish_finalization(state: &SharedState, locked: &mut LockedRound) -> ServiceResult<()> {
    if locked.round().finalization_published {
        return Ok(());
    }

    if let Err(err) = finalization::publish_finalized(state.bus(), locked.round()).await {
        warn!(round_id = %locked.round().id, error = %err, "finalization publication failed");
        return Err(err.into());
    }
    locked.round_mut().finalization_published = true;
    locked.commit(state).await?;

    lifecycle_events::publish_round_finalized(state, locked.round()).await;
    Ok(())
}

/// Change the details of an upcoming round.
///
/// The creator may always edit; anyone else needs an admin or editor role.
/// Moving the start schedules a fresh set of events; the old ones become stale.
pub async fn edit_round(
    state: &SharedState,
    round_id: RoundId,
    requestor: UserId,
    update: RoundUpdate,
) -> ServiceResult<Round> {
    validate_update(&update, state.now())?;

    // Refuse closed rounds before paying for a role lookup.
    let current = get_round(state, round_id).await?;
    state_machine::plan(current.phase, RoundTrigger::Edit)?;
    if current.created_by != requestor {
        authorize_manager(state, &requestor, "edit rounds").await?;
    }

    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::Edit)?;

    // Schedule before committing: if the save fails the new events are stale.
    if let Some(start) = update
        .start_time
        .filter(|start| *start != locked.round().start_time)
    {
        scheduler::schedule_round(state.scheduler(), round_id, start, state.config().reminders)
            .await?;
    }

    locked.apply(&plan);
    let rescheduled = locked.round_mut().apply_update(update);
    locked.commit(state).await?;

    info!(round_id = %round_id, requestor = %requestor, rescheduled, "round edited");
    lifecycle_events::publish_round_updated(state, locked.round(), rescheduled).await;
    Ok(locked.into_round())
}

/// Tombstone a round. Finalized rounds are immutable history.
pub async fn delete_round(state: &SharedState, round_id: RoundId) -> ServiceResult<EventOutcome> {
    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::Delete)?;
    if plan.is_ignored() {
        return Ok(EventOutcome::Ignored);
    }

    locked.apply(&plan);
    locked.commit(state).await?;

    info!(round_id = %round_id, from = ?plan.from, "round deleted");
    lifecycle_events::publish_round_deleted(state, locked.round()).await;
    Ok(EventOutcome::Applied)
}

/// Correct a finalized score, keeping the sealed ledger and appending an audit entry.
pub async fn correct_score(
    state: &SharedState,
    round_id: RoundId,
    requestor: UserId,
    user_id: UserId,
    score: Score,
) -> ServiceResult<ScoreCorrection> {
    let current = get_round(state, round_id).await?;
    state_machine::plan(current.phase, RoundTrigger::CorrectScore)?;
    authorize_manager(state, &requestor, "correct scores").await?;

    let mut locked = require_round(state, round_id).await?;
    let plan = locked.plan(RoundTrigger::CorrectScore)?;

    let round = locked.round();
    let participant = round.participant(&user_id).ok_or_else(|| {
        ServiceError::NotFound(format!("participant {user_id} in round {round_id}"))
    })?;
    if !participant.response.expects_score() {
        return Err(ServiceError::InvalidInput(format!(
            "participant {user_id} declined round {round_id}"
        )));
    }
    let previous = participant
        .score
        .or_else(|| round.finalized_scores.get(&user_id).copied())
        .unwrap_or_default();

    let correction = ScoreCorrection {
        user_id: user_id.clone(),
        previous,
        corrected: score,
        corrected_by: requestor,
        corrected_at: state.now(),
    };

    locked.apply(&plan);
    let round = locked.round_mut();
    round.score_corrections.push(correction.clone());
    if let Some(participant) = round.participants.get_mut(&user_id) {
        participant.score = Some(score);
    }
    locked.commit(state).await?;

    info!(
        round_id = %round_id,
        user_id = %user_id,
        previous,
        corrected = score,
        "finalized score corrected"
    );
    lifecycle_events::publish_score_corrected(state, locked.round(), &correction).await;
    Ok(correction)
}

/// Latest committed state of a round.
pub async fn get_round(state: &SharedState, round_id: RoundId) -> ServiceResult<Round> {
    state
        .store()
        .find_round(round_id)
        .await?
        .map(Round::from)
        .ok_or_else(|| not_found(round_id))
}

/// Every round, deleted ones included, by identifier.
pub async fn list_rounds(state: &SharedState) -> ServiceResult<Vec<Round>> {
    let rounds = state.store().list_rounds().await?;
    Ok(rounds.into_iter().map(Round::from).collect())
}

/// Lock and load a round, finishing an interrupted finalization publication first.
async fn load_round(state: &SharedState, round_id: RoundId) -> ServiceResult<Option<LockedRound>> {
    let Some(mut locked) = state.lock_round(round_id).await? else {
        return Ok(None);
    };

    if locked.round().phase == RoundPhase::Finalized && !locked.round().finalization_published {
        warn!(round_id = %round_id, "retrying unpublished finalization");
        publish_finalization(state, &mut locked).await?;
    }
    Ok(Some(locked))
}

async fn require_round(state: &SharedState, round_id: RoundId) -> ServiceResult<LockedRound> {
    load_round(state, round_id)
        .await?
        .ok_or_else(|| not_found(round_id))
}

async fn authorize_manager(state: &SharedState, requestor: &UserId, action: &str) -> ServiceResult<()> {
    match state.roles().role(requestor).await? {
        Some(role) if role.can_manage_rounds() => Ok(()),
        Some(role) => Err(ServiceError::Unauthorized(format!(
            "{requestor} ({role:?}) may not {action}"
        ))),
        None => Err(ServiceError::Unauthorized(format!(
            "unknown user {requestor} may not {action}"
        ))),
    }
}

fn is_stale(locked: &LockedRound, scheduled: Option<&ScheduledRoundEvent>) -> bool {
    let current_start = locked.round().start_time;
    match scheduled {
        Some(event) if event.is_stale(current_start) => {
            debug!(
                round_id = %event.round_id,
                kind = ?event.kind,
                scheduled_for = %event.start_time,
                %current_start,
                "dropping event scheduled for a previous start time"
            );
            true
        }
        _ => false,
    }
}

fn participant_or_new(round: &Round, user_id: &UserId, response: ParticipantResponse) -> Participant {
    round
        .participant(user_id)
        .cloned()
        .unwrap_or_else(|| Participant::new(user_id.clone(), response))
}

fn validate_draft(draft: &RoundDraft, now: OffsetDateTime) -> ServiceResult<()> {
    if draft.title.trim().is_empty() {
        return Err(ServiceError::InvalidInput("title must not be empty".into()));
    }
    if draft.created_by.as_str().trim().is_empty() {
        return Err(ServiceError::InvalidInput("creator must not be empty".into()));
    }
    if draft.start_time <= now {
        return Err(ServiceError::InvalidInput(format!(
            "start time {} is not in the future",
            draft.start_time
        )));
    }
    Ok(())
}

fn validate_update(update: &RoundUpdate, now: OffsetDateTime) -> ServiceResult<()> {
    if update.is_empty() {
        return Err(ServiceError::InvalidInput("no field to update".into()));
    }
    if update
        .title
        .as_deref()
        .is_some_and(|title| title.trim().is_empty())
    {
        return Err(ServiceError::InvalidInput("title must not be empty".into()));
    }
    if update.start_time.is_some_and(|start| start <= now) {
        return Err(ServiceError::InvalidInput(
            "start time must be in the future".into(),
        ));
    }
    Ok(())
}

fn not_found(round_id: RoundId) -> ServiceError {
    ServiceError::NotFound(format!("round {round_id}"))
}
