//! Subject names shared by publishers and consumers.

/// Delayed reminder fired ahead of a round start (internal).
pub const SCHEDULED_REMINDER: &str = "round.scheduled.reminder";
/// Delayed start trigger fired at the round start instant (internal).
pub const SCHEDULED_START: &str = "round.scheduled.start";

/// Outbound: a round was created.
pub const ROUND_CREATED: &str = "round.created";
/// Outbound: round details were edited.
pub const ROUND_UPDATED: &str = "round.updated";
/// Outbound: one hour reminder for participants.
pub const ROUND_REMINDER_ONE_HOUR: &str = "round.reminder.one_hour";
/// Outbound: thirty minute reminder for participants.
pub const ROUND_REMINDER_THIRTY_MINUTES: &str = "round.reminder.thirty_minutes";
/// Outbound: the round moved to in-progress.
pub const ROUND_STARTED: &str = "round.started";
/// Outbound: the round was finalized.
pub const ROUND_FINALIZED: &str = "round.finalized";
/// Outbound: the round was deleted.
pub const ROUND_DELETED: &str = "round.deleted";
/// Outbound: a participant joined or changed their response.
pub const PARTICIPANT_JOINED: &str = "round.participant.joined";
/// Outbound: a participant's ranking tag was resolved.
pub const PARTICIPANT_TAG_RESOLVED: &str = "round.participant.tag_resolved";
/// Outbound: a score was recorded.
pub const SCORE_SUBMITTED: &str = "round.score.submitted";
/// Outbound: a finalized score was corrected.
pub const SCORE_CORRECTED: &str = "round.score.corrected";

/// Downstream publication consumed by the ranking subsystem.
pub const LEADERBOARD_ROUND_FINALIZED: &str = "leaderboard.round.finalized";

/// Cross-context request: ranking tag for a user.
pub const TAG_NUMBER_REQUEST: &str = "leaderboard.tag_number.request";
/// Cross-context response: ranking tag for a user.
pub const TAG_NUMBER_RESPONSE: &str = "leaderboard.tag_number.response";
/// Cross-context request: permission role for a user.
pub const ROLE_LOOKUP_REQUEST: &str = "user.role.request";
/// Cross-context response: permission role for a user.
pub const ROLE_LOOKUP_RESPONSE: &str = "user.role.response";

/// Inbound command: create a round.
pub const COMMAND_CREATE: &str = "round.command.create";
/// Inbound command: join a round.
pub const COMMAND_JOIN: &str = "round.command.join";
/// Inbound command: submit a score.
pub const COMMAND_SUBMIT_SCORE: &str = "round.command.submit_score";
/// Inbound command: edit a round.
pub const COMMAND_EDIT: &str = "round.command.edit";
/// Inbound command: delete a round.
pub const COMMAND_DELETE: &str = "round.command.delete";
/// Inbound command: finalize a round now.
pub const COMMAND_FINALIZE: &str = "round.command.finalize";
