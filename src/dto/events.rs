//! Payloads published on the outbound lifecycle and downstream subjects.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::{
    round::{ParticipantResponse, Round, RoundId, Score, TagNumber, UserId},
    state_machine::RoundPhase,
};

/// Published on `round.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCreatedEvent {
    pub round_id: RoundId,
    pub title: String,
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub created_by: UserId,
}

/// Published on `round.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundUpdatedEvent {
    pub round_id: RoundId,
    pub title: String,
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Whether the start moved and new schedule events were registered.
    pub rescheduled: bool,
}

/// Published on both reminder subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReminderEvent {
    pub round_id: RoundId,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Participants expected to play.
    pub participants: Vec<UserId>,
}

/// Published on `round.started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStartedEvent {
    pub round_id: RoundId,
    pub title: String,
    /// Participants whose score was seeded.
    pub participants: Vec<UserId>,
}

/// Published on `round.finalized` and `round.deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPhaseEvent {
    pub round_id: RoundId,
    pub phase: RoundPhase,
}

/// Published on `round.participant.joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantJoinedEvent {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub response: ParticipantResponse,
    /// Response before a re-join, absent for first joins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response: Option<ParticipantResponse>,
}

/// Published on `round.participant.tag_resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResolvedEvent {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub tag_number: TagNumber,
}

/// Published on `round.score.submitted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmittedEvent {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub score: Score,
}

/// Published on `round.score.corrected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCorrectedEvent {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub previous: Score,
    pub corrected: Score,
    pub corrected_by: UserId,
}

/// One participant line of a finalized round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedEntry {
    pub user_id: UserId,
    /// Absent when the tag lookup never answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_number: Option<TagNumber>,
    pub score: Score,
}

/// Downstream publication consumed by the ranking subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedRound {
    pub round_id: RoundId,
    pub entries: Vec<FinalizedEntry>,
}

impl FinalizedRound {
    /// Assemble the publication from a round whose scores are sealed.
    ///
    /// Entries follow participant join order.
    pub fn from_round(round: &Round) -> Self {
        let entries = round
            .participants
            .values()
            .filter_map(|participant| {
                round
                    .finalized_scores
                    .get(&participant.user_id)
                    .map(|score| FinalizedEntry {
                        user_id: participant.user_id.clone(),
                        tag_number: participant.tag_number,
                        score: *score,
                    })
            })
            .collect();

        Self {
            round_id: round.id,
            entries,
        }
    }
}
