use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::{
    round::{ParticipantResponse, RoundId, Score, TagNumber, UserId},
    state_machine::RoundPhase,
};

/// Participant row embedded in a round entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// External user identity.
    pub user_id: UserId,
    /// Resolved ranking tag, if any.
    pub tag_number: Option<TagNumber>,
    /// Invitation response.
    pub response: ParticipantResponse,
    /// Individual score.
    pub score: Option<Score>,
}

/// One `(participant, score)` pair of a score ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntryEntity {
    /// Participant identity.
    pub user_id: UserId,
    /// Recorded score.
    pub score: Score,
}

/// Audit entry for a post-finalization correction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreCorrectionEntity {
    /// Participant identity.
    pub user_id: UserId,
    /// Score before the correction.
    pub previous: Score,
    /// Score after the correction.
    pub corrected: Score,
    /// Requestor identity.
    pub corrected_by: UserId,
    /// Correction timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub corrected_at: OffsetDateTime,
}

/// Round aggregate persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Primary key.
    pub id: RoundId,
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional location.
    pub location: Option<String>,
    /// Optional event type tag.
    pub event_type: Option<String>,
    /// Scheduled start.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Lifecycle state.
    pub phase: RoundPhase,
    /// Creator identity.
    pub created_by: UserId,
    /// Participants in join order.
    pub participants: Vec<ParticipantEntity>,
    /// Scores awaiting finalization.
    pub pending_scores: Vec<ScoreEntryEntity>,
    /// Scores frozen at finalization.
    pub finalized_scores: Vec<ScoreEntryEntity>,
    /// Corrections applied after finalization.
    pub score_corrections: Vec<ScoreCorrectionEntity>,
    /// Whether the downstream finalization event was published.
    pub finalization_published: bool,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last update timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Optimistic concurrency version.
    pub version: u64,
}

/// Round fields known before the store assigns an identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRoundEntity {
    /// Display title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional location.
    pub location: Option<String>,
    /// Optional event type tag.
    pub event_type: Option<String>,
    /// Scheduled start.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Initial lifecycle state.
    pub phase: RoundPhase,
    /// Creator identity.
    pub created_by: UserId,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl NewRoundEntity {
    /// Materialise the entity once the store picked an identifier.
    pub fn into_entity(self, id: RoundId) -> RoundEntity {
        RoundEntity {
            id,
            title: self.title,
            description: self.description,
            location: self.location,
            event_type: self.event_type,
            start_time: self.start_time,
            phase: self.phase,
            created_by: self.created_by,
            participants: Vec::new(),
            pending_scores: Vec::new(),
            finalized_scores: Vec::new(),
            score_corrections: Vec::new(),
            finalization_published: false,
            created_at: self.created_at,
            updated_at: self.created_at,
            version: 1,
        }
    }
}
