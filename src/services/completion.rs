//! Decides whether a round has collected every expected score.

use indexmap::IndexMap;

use crate::state::round::{Participant, Round, Score, UserId};

/// `true` iff every accepted or tentative participant has a pending score.
///
/// A round without eligible participants is complete.
pub fn is_complete(
    participants: &IndexMap<UserId, Participant>,
    pending_scores: &IndexMap<UserId, Score>,
) -> bool {
    participants
        .values()
        .filter(|participant| participant.response.expects_score())
        .all(|participant| pending_scores.contains_key(&participant.user_id))
}

/// Eligible participants still missing a score, in join order.
pub fn missing_scores<'a>(
    participants: &'a IndexMap<UserId, Participant>,
    pending_scores: &IndexMap<UserId, Score>,
) -> Vec<&'a UserId> {
    participants
        .values()
        .filter(|participant| participant.response.expects_score())
        .filter(|participant| !pending_scores.contains_key(&participant.user_id))
        .map(|participant| &participant.user_id)
        .collect()
}

/// [`is_complete`] applied to a round.
pub fn round_is_complete(round: &Round) -> bool {
    is_complete(&round.participants, &round.pending_scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::round::ParticipantResponse;

    fn participants(entries: &[(&str, ParticipantResponse)]) -> IndexMap<UserId, Participant> {
        entries
            .iter()
            .map(|(id, response)| (UserId::from(*id), Participant::new((*id).into(), *response)))
            .collect()
    }

    #[test]
    fn empty_eligible_set_is_complete() {
        let declined = participants(&[("p1", ParticipantResponse::Declined)]);
        assert!(is_complete(&IndexMap::new(), &IndexMap::new()));
        assert!(is_complete(&declined, &IndexMap::new()));
    }

    #[test]
    fn completes_exactly_on_the_covering_submission() {
        let players = participants(&[
            ("p1", ParticipantResponse::Accepted),
            ("p2", ParticipantResponse::Tentative),
            ("p3", ParticipantResponse::Declined),
            ("p4", ParticipantResponse::Accepted),
        ]);
        let submissions = [("p4", 70), ("p1", 71), ("p4", 69), ("p2", 80)];
        let mut pending = IndexMap::new();

        for (index, (user, score)) in submissions.iter().enumerate() {
            assert!(!is_complete(&players, &pending), "complete before submission {index}");
            pending.insert(UserId::from(*user), *score);
        }

        assert!(is_complete(&players, &pending));
        assert!(missing_scores(&players, &pending).is_empty());
    }

    #[test]
    fn declined_scores_do_not_count() {
        let players = participants(&[
            ("p1", ParticipantResponse::Accepted),
            ("p2", ParticipantResponse::Declined),
        ]);
        let pending: IndexMap<_, _> = [(UserId::from("p2"), 90)].into_iter().collect();

        assert!(!is_complete(&players, &pending));
        assert_eq!(missing_scores(&players, &pending), vec![&UserId::from("p1")]);
    }
}
