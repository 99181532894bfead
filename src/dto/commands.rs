//! Inbound commands received on the `round.command.*` subjects.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::round::{
    ParticipantResponse, RoundDraft, RoundId, RoundUpdate, Score, UserId,
};

/// `round.command.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoundCommand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub created_by: UserId,
}

impl From<CreateRoundCommand> for RoundDraft {
    fn from(value: CreateRoundCommand) -> Self {
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

/// `round.command.join`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoundCommand {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub response: ParticipantResponse,
}

/// `round.command.submit_score`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitScoreCommand {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub score: Score,
}

/// `round.command.edit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRoundCommand {
    pub round_id: RoundId,
    pub requestor: UserId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
}

impl EditRoundCommand {
    /// Field changes carried by the command.
    pub fn update(&self) -> RoundUpdate {
        RoundUpdate {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            event_type: self.event_type.clone(),
            start_time: self.start_time,
        }
    }
}

/// `round.command.delete` and `round.command.finalize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCommand {
    pub round_id: RoundId,
}
