use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    dao::models::{
        NewRoundEntity, ParticipantEntity, RoundEntity, ScoreCorrectionEntity, ScoreEntryEntity,
    },
    state::state_machine::RoundPhase,
};

/// Opaque ordinal identifier of a round, assigned by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External user identity, owned by the user bounded context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Borrow the raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ranking tag assigned by the leaderboard bounded context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TagNumber(pub u32);

impl fmt::Display for TagNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Score recorded for one participant.
pub type Score = i32;

/// How a user answered the round invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantResponse {
    /// Will play.
    Accepted,
    /// Might play; still expected to submit a score.
    Tentative,
    /// Will not play.
    Declined,
}

impl ParticipantResponse {
    /// Whether participants with this response are expected to submit a score.
    pub fn expects_score(self) -> bool {
        matches!(self, Self::Accepted | Self::Tentative)
    }
}

/// A user's membership in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Identity of the member.
    pub user_id: UserId,
    /// Ranking tag, `None` until (and unless) the tag lookup answers.
    pub tag_number: Option<TagNumber>,
    /// Invitation response.
    pub response: ParticipantResponse,
    /// Individual score, seeded to zero when the round starts.
    pub score: Option<Score>,
}

impl Participant {
    /// A freshly joined participant with no tag and no score.
    pub fn new(user_id: UserId, response: ParticipantResponse) -> Self {
        Self {
            user_id,
            tag_number: None,
            response,
            score: None,
        }
    }
}

/// Audit entry for a manual change to a finalized score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCorrection {
    /// Participant whose score changed.
    pub user_id: UserId,
    /// Score before the correction.
    pub previous: Score,
    /// Score after the correction.
    pub corrected: Score,
    /// Who requested the correction.
    pub corrected_by: UserId,
    /// When the correction was applied.
    pub corrected_at: OffsetDateTime,
}

/// What happened to the participant list on a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantChange {
    /// A new participant was appended.
    Added,
    /// An existing participant changed their response.
    ResponseChanged {
        /// Response before the update.
        previous: ParticipantResponse,
    },
    /// The participant already existed with the same response.
    Unchanged,
}

/// Field changes accepted while a round is upcoming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New location.
    pub location: Option<String>,
    /// New event type tag.
    pub event_type: Option<String>,
    /// New start instant.
    pub start_time: Option<OffsetDateTime>,
}

impl RoundUpdate {
    /// Whether the update carries no change at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Fields required to create a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundDraft {
    /// Display title.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Optional location.
    pub location: Option<String>,
    /// Optional event type tag.
    pub event_type: Option<String>,
    /// Scheduled start instant.
    pub start_time: OffsetDateTime,
    /// Creator identity.
    pub created_by: UserId,
}

/// The round aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    /// Store-assigned identifier.
    pub id: RoundId,
    /// Display title.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Optional location.
    pub location: Option<String>,
    /// Optional event type tag.
    pub event_type: Option<String>,
    /// Scheduled start instant.
    pub start_time: OffsetDateTime,
    /// Lifecycle state.
    pub phase: RoundPhase,
    /// Creator identity.
    pub created_by: UserId,
    /// Participants in join order.
    pub participants: IndexMap<UserId, Participant>,
    /// Scores submitted but not yet finalized, last write wins per participant.
    pub pending_scores: IndexMap<UserId, Score>,
    /// Scores frozen at finalization. Never rewritten once populated.
    pub finalized_scores: IndexMap<UserId, Score>,
    /// Manual corrections applied after finalization.
    pub score_corrections: Vec<ScoreCorrection>,
    /// Whether the downstream finalization event went out.
    pub finalization_published: bool,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last mutation timestamp.
    pub updated_at: OffsetDateTime,
    /// Optimistic concurrency version, bumped by the store on every save.
    pub version: u64,
}

impl Round {
    /// Participants expected to submit a score (accepted or tentative).
    pub fn eligible_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .values()
            .filter(|participant| participant.response.expects_score())
    }

    /// Look up a participant.
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    /// Append a participant, or update the response of an existing one in place.
    pub fn upsert_participant(
        &mut self,
        user_id: UserId,
        response: ParticipantResponse,
    ) -> ParticipantChange {
        match self.participants.get_mut(&user_id) {
            Some(existing) if existing.response == response => ParticipantChange::Unchanged,
            Some(existing) => {
                let previous = existing.response;
                existing.response = response;
                if !response.expects_score() {
                    existing.score = None;
                    self.pending_scores.shift_remove(&user_id);
                }
                ParticipantChange::ResponseChanged { previous }
            }
            None => {
                self.participants
                    .insert(user_id.clone(), Participant::new(user_id, response));
                ParticipantChange::Added
            }
        }
    }

    /// Seed a zero score for every eligible participant that has none yet.
    ///
    /// Returns how many participants were seeded.
    pub fn seed_scores(&mut self) -> usize {
        let mut seeded = 0;
        for participant in self.participants.values_mut() {
            if participant.response.expects_score() && participant.score.is_none() {
                participant.score = Some(0);
                seeded += 1;
            }
        }
        seeded
    }

    /// Record (or overwrite) a participant's pending score.
    pub fn record_score(&mut self, user_id: &UserId, score: Score) {
        self.pending_scores.insert(user_id.clone(), score);
        if let Some(participant) = self.participants.get_mut(user_id) {
            participant.score = Some(score);
        }
    }

    /// Move pending scores into the finalized ledger, leaving pending empty.
    pub fn seal_scores(&mut self) {
        debug_assert!(self.finalized_scores.is_empty(), "scores sealed twice");
        self.finalized_scores = std::mem::take(&mut self.pending_scores);
    }

    /// Fill in a resolved ranking tag. Returns `false` when the participant is unknown.
    pub fn set_tag(&mut self, user_id: &UserId, tag_number: TagNumber) -> bool {
        match self.participants.get_mut(user_id) {
            Some(participant) => {
                participant.tag_number = Some(tag_number);
                true
            }
            None => false,
        }
    }

    /// Apply edited fields. Returns `true` when the start instant moved.
    pub fn apply_update(&mut self, update: RoundUpdate) -> bool {
        let RoundUpdate {
            title,
            description,
            location,
            event_type,
            start_time,
        } = update;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = Some(description);
        }
        if let Some(location) = location {
            self.location = Some(location);
        }
        if let Some(event_type) = event_type {
            self.event_type = Some(event_type);
        }
        match start_time {
            Some(start_time) if start_time != self.start_time => {
                self.start_time = start_time;
                true
            }
            _ => false,
        }
    }
}

impl RoundDraft {
    /// Convert the draft into the entity the store persists.
    pub fn into_entity(self, now: OffsetDateTime) -> NewRoundEntity {
        NewRoundEntity {
            title: self.title,
            description: self.description,
            location: self.location,
            event_type: self.event_type,
            start_time: self.start_time,
            phase: RoundPhase::Upcoming,
            created_by: self.created_by,
            created_at: now,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            tag_number: value.tag_number,
            response: value.response,
            score: value.score,
        }
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            user_id: value.user_id,
            tag_number: value.tag_number,
            response: value.response,
            score: value.score,
        }
    }
}

impl From<ScoreCorrectionEntity> for ScoreCorrection {
    fn from(value: ScoreCorrectionEntity) -> Self {
        Self {
            user_id: value.user_id,
            previous: value.previous,
            corrected: value.corrected,
            corrected_by: value.corrected_by,
            corrected_at: value.corrected_at,
        }
    }
}

impl From<ScoreCorrection> for ScoreCorrectionEntity {
    fn from(value: ScoreCorrection) -> Self {
        Self {
            user_id: value.user_id,
            previous: value.previous,
            corrected: value.corrected,
            corrected_by: value.corrected_by,
            corrected_at: value.corrected_at,
        }
    }
}

fn scores_from_entries(entries: Vec<ScoreEntryEntity>) -> IndexMap<UserId, Score> {
    entries
        .into_iter()
        .map(|entry| (entry.user_id, entry.score))
        .collect()
}

fn scores_into_entries(scores: IndexMap<UserId, Score>) -> Vec<ScoreEntryEntity> {
    scores
        .into_iter()
        .map(|(user_id, score)| ScoreEntryEntity { user_id, score })
        .collect()
}

impl From<RoundEntity> for Round {
    fn from(value: RoundEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            location: value.location,
            event_type: value.event_type,
            start_time: value.start_time,
            phase: value.phase,
            created_by: value.created_by,
            participants: value
                .participants
                .into_iter()
                .map(|participant| (participant.user_id.clone(), participant.into()))
                .collect(),
            pending_scores: scores_from_entries(value.pending_scores),
            finalized_scores: scores_from_entries(value.finalized_scores),
            score_corrections: value.score_corrections.into_iter().map(Into::into).collect(),
            finalization_published: value.finalization_published,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}

impl From<Round> for RoundEntity {
    fn from(value: Round) -> Self {
        Self {
            id: value.id,
            title: value.title,
            description: value.description,
            location: value.location,
            event_type: value.event_type,
            start_time: value.start_time,
            phase: value.phase,
            created_by: value.created_by,
            participants: value.participants.into_values().map(Into::into).collect(),
            pending_scores: scores_into_entries(value.pending_scores),
            finalized_scores: scores_into_entries(value.finalized_scores),
            score_corrections: value.score_corrections.into_iter().map(Into::into).collect(),
            finalization_published: value.finalization_published,
            created_at: value.created_at,
            updated_at: value.updated_at,
            version: value.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn round() -> Round {
        let now = datetime!(2026-05-01 10:00 UTC);
        Round {
            id: RoundId(1),
            title: "Club Championship".into(),
            description: None,
            location: Some("Hornets Nest".into()),
            event_type: None,
            start_time: now + time::Duration::hours(2),
            phase: RoundPhase::Upcoming,
            created_by: "creator".into(),
            participants: IndexMap::new(),
            pending_scores: IndexMap::new(),
            finalized_scores: IndexMap::new(),
            score_corrections: Vec::new(),
            finalization_published: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn declining_clears_the_participant_score() {
        let mut round = round();
        round.upsert_participant("p1".into(), ParticipantResponse::Accepted);
        round.record_score(&"p1".into(), 72);

        round.upsert_participant("p1".into(), ParticipantResponse::Declined);

        let p1 = round.participant(&"p1".into()).unwrap();
        assert_eq!(p1.score, None);
        assert!(round.pending_scores.is_empty());
    }

    #[test]
    fn rejoin_updates_response_in_place() {
        let mut round = round();
        assert_eq!(
            round.upsert_participant("p1".into(), ParticipantResponse::Declined),
            ParticipantChange::Added
        );
        assert_eq!(
            round.upsert_participant("p1".into(), ParticipantResponse::Accepted),
            ParticipantChange::ResponseChanged {
                previous: ParticipantResponse::Declined
            }
        );
        assert_eq!(
            round.upsert_participant("p1".into(), ParticipantResponse::Accepted),
            ParticipantChange::Unchanged
        );
        assert_eq!(round.participants.len(), 1);
    }

    #[test]
    fn declining_drops_pending_score() {
        let mut round = round();
        round.upsert_participant("p1".into(), ParticipantResponse::Accepted);
        round.record_score(&"p1".into(), 70);

        round.upsert_participant("p1".into(), ParticipantResponse::Declined);

        assert!(round.pending_scores.is_empty());
    }

    #[test]
    fn seeding_only_touches_eligible_participants_once() {
        let mut round = round();
        round.upsert_participant("p1".into(), ParticipantResponse::Accepted);
        round.upsert_participant("p2".into(), ParticipantResponse::Tentative);
        round.upsert_participant("p3".into(), ParticipantResponse::Declined);

        assert_eq!(round.seed_scores(), 2);
        assert_eq!(round.seed_scores(), 0);
        assert_eq!(round.participant(&"p3".into()).unwrap().score, None);
        assert_eq!(round.participant(&"p1".into()).unwrap().score, Some(0));
    }

    #[test]
    fn sealing_moves_pending_scores() {
        let mut round = round();
        round.upsert_participant("p1".into(), ParticipantResponse::Accepted);
        round.record_score(&"p1".into(), 72);
        round.record_score(&"p1".into(), 71);

        round.seal_scores();

        assert!(round.pending_scores.is_empty());
        assert_eq!(round.finalized_scores.get(&UserId::from("p1")), Some(&71));
    }

    #[test]
    fn update_reports_start_time_moves_only() {
        let mut round = round();
        let same_start = round.start_time;
        assert!(!round.apply_update(RoundUpdate {
            title: Some("Renamed".into()),
            start_time: Some(same_start),
            ..RoundUpdate::default()
        }));
        assert_eq!(round.title, "Renamed");

        assert!(round.apply_update(RoundUpdate {
            start_time: Some(same_start + time::Duration::hours(1)),
            ..RoundUpdate::default()
        }));
    }

    #[test]
    fn entity_conversion_preserves_participant_order() {
        let mut round = round();
        for user in ["zed", "amy", "bob"] {
            round.upsert_participant(user.into(), ParticipantResponse::Accepted);
        }

        let restored: Round = RoundEntity::from(round.clone()).into();

        let order: Vec<_> = restored.participants.keys().map(UserId::as_str).collect();
        assert_eq!(order, vec!["zed", "amy", "bob"]);
        assert_eq!(restored, round);
    }
}
