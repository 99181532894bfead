//! Emits the downstream publication of a finalized round.
//!
//! Only called from inside the finalize transition, which records a
//! successful publication on the round so it never goes out twice.

use tracing::info;

use crate::{
    bus::{BusResult, Message, MessageBus, subjects},
    dto::events::FinalizedRound,
    state::round::Round,
};

/// Publish the sealed scores of `round` to the ranking subsystem.
pub async fn publish_finalized(bus: &dyn MessageBus, round: &Round) -> BusResult<FinalizedRound> {
    let payload = FinalizedRound::from_round(round);
    let message = Message::json(subjects::LEADERBOARD_ROUND_FINALIZED, &payload)?;
    bus.publish(message).await?;

    info!(
        round_id = %round.id,
        entries = payload.entries.len(),
        "published finalized round"
    );
    Ok(payload)
}
