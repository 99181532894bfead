//! DTO definitions used by the round REST API and documentation layer.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    dto::format_instant,
    state::{
        round::{
            Participant, ParticipantResponse, Round, RoundDraft, RoundId, RoundUpdate, Score,
            ScoreCorrection, TagNumber, UserId,
        },
        state_machine::RoundPhase,
    },
};

/// Payload used to schedule a new round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoundRequest {
    #[validate(length(min = 1, max = 120), custom(function = "not_blank"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    /// RFC 3339 instant; must be in the future.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[schema(value_type = String)]
    pub created_by: UserId,
}

impl From<CreateRoundRequest> for RoundDraft {
    fn from(value: CreateRoundRequest) -> Self {
        Self {
            title: value.title,
            description: value.description,
            location: value.location,
            event_type: value.event_type,
            start_time: value.start_time,
            created_by: value.created_by,
        }
    }
}

/// Join a round, or change the response of an existing participant.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRoundRequest {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub response: ParticipantResponse,
}

/// Record a participant's score.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitScoreRequest {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub score: Score,
}

/// Edit the details of an upcoming round. Omitted fields are left untouched.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EditRoundRequest {
    #[schema(value_type = String)]
    pub requestor: UserId,
    #[serde(default)]
    #[validate(length(min = 1, max = 120), custom(function = "not_blank"))]
    pub title: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
}

impl EditRoundRequest {
    /// Split the request into requestor and field changes.
    pub fn into_parts(self) -> (UserId, RoundUpdate) {
        (
            self.requestor,
            RoundUpdate {
                title: self.title,
                description: self.description,
                location: self.location,
                event_type: self.event_type,
                start_time: self.start_time,
            },
        )
    }
}

/// Correct a finalized score.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectScoreRequest {
    #[schema(value_type = String)]
    pub requestor: UserId,
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub score: Score,
}

/// A participant as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantSummary {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[schema(value_type = Option<u32>)]
    pub tag_number: Option<TagNumber>,
    pub response: ParticipantResponse,
    pub score: Option<Score>,
}

impl From<&Participant> for ParticipantSummary {
    fn from(value: &Participant) -> Self {
        Self {
            user_id: value.user_id.clone(),
            tag_number: value.tag_number,
            response: value.response,
            score: value.score,
        }
    }
}

/// `(participant, score)` pair.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreLine {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub score: Score,
}

/// Audited post-finalization correction.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreCorrectionSummary {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub previous: Score,
    pub corrected: Score,
    #[schema(value_type = String)]
    pub corrected_by: UserId,
    pub corrected_at: String,
}

impl From<&ScoreCorrection> for ScoreCorrectionSummary {
    fn from(value: &ScoreCorrection) -> Self {
        Self {
            user_id: value.user_id.clone(),
            previous: value.previous,
            corrected: value.corrected,
            corrected_by: value.corrected_by.clone(),
            corrected_at: format_instant(value.corrected_at),
        }
    }
}

/// Full view of a round.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    #[schema(value_type = u64)]
    pub id: RoundId,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<String>,
    pub start_time: String,
    pub phase: RoundPhase,
    #[schema(value_type = String)]
    pub created_by: UserId,
    pub participants: Vec<ParticipantSummary>,
    pub pending_scores: Vec<ScoreLine>,
    pub finalized_scores: Vec<ScoreLine>,
    pub score_corrections: Vec<ScoreCorrectionSummary>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Round> for RoundSummary {
    fn from(value: &Round) -> Self {
        let lines = |scores: &indexmap::IndexMap<UserId, Score>| {
            scores
                .iter()
                .map(|(user_id, score)| ScoreLine {
                    user_id: user_id.clone(),
                    score: *score,
                })
                .collect()
        };

        Self {
            id: value.id,
            title: value.title.clone(),
            description: value.description.clone(),
            location: value.location.clone(),
            event_type: value.event_type.clone(),
            start_time: format_instant(value.start_time),
            phase: value.phase,
            created_by: value.created_by.clone(),
            participants: value.participants.values().map(Into::into).collect(),
            pending_scores: lines(&value.pending_scores),
            finalized_scores: lines(&value.finalized_scores),
            score_corrections: value.score_corrections.iter().map(Into::into).collect(),
            created_at: format_instant(value.created_at),
            updated_at: format_instant(value.updated_at),
        }
    }
}

/// Minimal projection used when listing rounds.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundListItem {
    #[schema(value_type = u64)]
    pub id: RoundId,
    pub title: String,
    pub start_time: String,
    pub phase: RoundPhase,
    pub participants: usize,
}

impl From<&Round> for RoundListItem {
    fn from(value: &Round) -> Self {
        Self {
            id: value.id,
            title: value.title.clone(),
            start_time: format_instant(value.start_time),
            phase: value.phase,
            participants: value.participants.len(),
        }
    }
}

/// Result of a score submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreReceiptResponse {
    #[schema(value_type = u64)]
    pub round_id: RoundId,
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub score: Score,
    /// Whether this submission completed the round.
    pub finalized: bool,
}

/// Generic acknowledgement for commands without a richer result.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must contain non-whitespace characters".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_titles_are_rejected() {
        let request: CreateRoundRequest = serde_json::from_value(json!({
            "title": "   ",
            "start_time": "2030-01-01T10:00:00Z",
            "created_by": "creator",
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn edit_without_title_skips_title_rules() {
        let request: EditRoundRequest = serde_json::from_value(json!({
            "requestor": "creator",
            "location": "Back nine",
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let (requestor, update) = request.into_parts();
        assert_eq!(requestor, UserId::from("creator"));
        assert_eq!(update.location.as_deref(), Some("Back nine"));
        assert!(update.start_time.is_none());
    }
}
