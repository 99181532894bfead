//! Outbound lifecycle notifications.
//!
//! These are informational: a failed publication is logged and absorbed so
//! it never undoes a committed state change. The downstream finalization
//! publication is not sent from here (see `finalization`).

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    bus::{Message, subjects},
    dto::events::{
        ParticipantJoinedEvent, RoundCreatedEvent, RoundPhaseEvent, RoundReminderEvent,
        RoundStartedEvent, RoundUpdatedEvent, ScoreCorrectedEvent, ScoreSubmittedEvent,
        TagResolvedEvent,
    },
    scheduler::ScheduledKind,
    state::{
        SharedState,
        round::{ParticipantResponse, Round, Score, ScoreCorrection, TagNumber, UserId},
    },
};

fn eligible_ids(round: &Round) -> Vec<UserId> {
    round
        .eligible_participants()
        .map(|participant| participant.user_id.clone())
        .collect()
}

/// Announce a newly scheduled round.
pub async fn publish_round_created(state: &SharedState, round: &Round) {
    let payload = RoundCreatedEvent {
        round_id: round.id,
        title: round.title.clone(),
        location: round.location.clone(),
        start_time: round.start_time,
        created_by: round.created_by.clone(),
    };
    send_event(state, subjects::ROUND_CREATED, &payload).await;
}

/// Announce edited round details.
pub async fn publish_round_updated(state: &SharedState, round: &Round, rescheduled: bool) {
    let payload = RoundUpdatedEvent {
        round_id: round.id,
        title: round.title.clone(),
        location: round.location.clone(),
        start_time: round.start_time,
        rescheduled,
    };
    send_event(state, subjects::ROUND_UPDATED, &payload).await;
}

/// Remind participants of an upcoming round.
pub async fn publish_reminder(state: &SharedState, round: &Round, kind: ScheduledKind) {
    let Some(subject) = kind.reminder_subject() else {
        return;
    };
    let payload = RoundReminderEvent {
        round_id: round.id,
        title: round.title.clone(),
        start_time: round.start_time,
        participants: eligible_ids(round),
    };
    send_event(state, subject, &payload).await;
}

/// Announce that the round is under way.
pub async fn publish_round_started(state: &SharedState, round: &Round) {
    let payload = RoundStartedEvent {
        round_id: round.id,
        title: round.title.clone(),
        participants: eligible_ids(round),
    };
    send_event(state, subjects::ROUND_STARTED, &payload).await;
}

/// Announce that scores are sealed.
pub async fn publish_round_finalized(state: &SharedState, round: &Round) {
    let payload = RoundPhaseEvent {
        round_id: round.id,
        phase: round.phase,
    };
    send_event(state, subjects::ROUND_FINALIZED, &payload).await;
}

/// Announce a deletion.
pub async fn publish_round_deleted(state: &SharedState, round: &Round) {
    let payload = RoundPhaseEvent {
        round_id: round.id,
        phase: round.phase,
    };
    send_event(state, subjects::ROUND_DELETED, &payload).await;
}

/// Announce a join or a response change.
pub async fn publish_participant_joined(
    state: &SharedState,
    round: &Round,
    user_id: &UserId,
    response: ParticipantResponse,
    previous_response: Option<ParticipantResponse>,
) {
    let payload = ParticipantJoinedEvent {
        round_id: round.id,
        user_id: user_id.clone(),
        response,
        previous_response,
    };
    send_event(state, subjects::PARTICIPANT_JOINED, &payload).await;
}

/// Announce that a participant's ranking tag is known.
pub async fn publish_tag_resolved(
    state: &SharedState,
    round: &Round,
    user_id: &UserId,
    tag_number: TagNumber,
) {
    let payload = TagResolvedEvent {
        round_id: round.id,
        user_id: user_id.clone(),
        tag_number,
    };
    send_event(state, subjects::PARTICIPANT_TAG_RESOLVED, &payload).await;
}

/// Announce a recorded score.
pub async fn publish_score_submitted(
    state: &SharedState,
    round: &Round,
    user_id: &UserId,
    score: Score,
) {
    let payload = ScoreSubmittedEvent {
        round_id: round.id,
        user_id: user_id.clone(),
        score,
    };
    send_event(state, subjects::SCORE_SUBMITTED, &payload).await;
}

/// Announce a post-finalization correction.
pub async fn publish_score_corrected(state: &SharedState, round: &Round, correction: &ScoreCorrection) {
    let payload = ScoreCorrectedEvent {
        round_id: round.id,
        user_id: correction.user_id.clone(),
        previous: correction.previous,
        corrected: correction.corrected,
        corrected_by: correction.corrected_by.clone(),
    };
    send_event(state, subjects::SCORE_CORRECTED, &payload).await;
}

/// Serialize and publish `payload` on `subject`, logging failures instead of propagating them.
async fn send_event<T: Serialize>(state: &SharedState, subject: &'static str, payload: &T) {
    let message = match Message::json(subject, payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(subject, error = %err, "failed to serialize lifecycle event");
            return;
        }
    };

    match state.bus().publish(message).await {
        Ok(()) => debug!(subject, "published lifecycle event"),
        Err(err) => warn!(subject, error = %err, "failed to publish lifecycle event"),
    }
}
