//! Bus consumers feeding scheduled events and inbound commands to the orchestrator.
//!
//! Each delivery is handled in its own task. Success and permanent failures
//! are acknowledged; transient failures (timeouts, transport, storage) are
//! rejected so the bus redelivers them. Every handler is idempotent, so a
//! redelivery never applies a change twice.

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    bus::{BusError, BusResult, Delivery, Message, Subscription, subjects},
    dto::commands::{
        CreateRoundCommand, EditRoundCommand, JoinRoundCommand, RoundCommand, SubmitScoreCommand,
    },
    error::ServiceError,
    scheduler::ScheduledRoundEvent,
    services::round_service,
    state::SharedState,
};

/// Subjects the coordinator consumes.
pub const CONSUMED_SUBJECTS: [&str; 8] = [
    subjects::SCHEDULED_REMINDER,
    subjects::SCHEDULED_START,
    subjects::COMMAND_CREATE,
    subjects::COMMAND_JOIN,
    subjects::COMMAND_SUBMIT_SCORE,
    subjects::COMMAND_EDIT,
    subjects::COMMAND_DELETE,
    subjects::COMMAND_FINALIZE,
];

#[derive(Debug, Error)]
enum ConsumerError {
    #[error(transparent)]
    Decode(#[from] BusError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("no handler for subject `{0}`")]
    UnknownSubject(String),
}

/// Subscribe to every consumed subject and start one consumer loop each.
///
/// All subscriptions are open when this returns.
pub async fn spawn_consumers(state: SharedState) -> BusResult<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(CONSUMED_SUBJECTS.len());
    for subject in CONSUMED_SUBJECTS {
        let subscription = state.bus().subscribe(subject).await?;
        handles.push(tokio::spawn(consume(state.clone(), subscription)));
    }
    info!(subjects = CONSUMED_SUBJECTS.len(), "round consumers started");
    Ok(handles)
}

async fn consume(state: SharedState, mut subscription: Subscription) {
    while let Some(delivery) = subscription.recv().await {
        let state = state.clone();
        tokio::spawn(async move { handle_delivery(&state, delivery).await });
    }
    debug!(subject = subscription.subject(), "consumer stopped");
}

/// Handle one delivery and settle it.
pub async fn handle_delivery(state: &SharedState, delivery: Delivery) {
    let result = dispatch(state, delivery.message()).await;
    let message = delivery.message();

    match result {
        Ok(()) => {
            debug!(subject = %message.subject, message_id = %message.id, "message handled");
            delivery.ack();
        }
        Err(ConsumerError::Service(err)) if !err.is_permanent() => {
            warn!(
                subject = %message.subject,
                message_id = %message.id,
                attempt = delivery.attempt(),
                error = %err,
                "transient failure; requesting redelivery"
            );
            delivery.nack();
        }
        Err(err) => {
            warn!(
                subject = %message.subject,
                message_id = %message.id,
                error = %err,
                "message rejected permanently"
            );
            delivery.ack();
        }
    }
}

async fn dispatch(state: &SharedState, message: &Message) -> Result<(), ConsumerError> {
    match message.subject.as_str() {
        subjects::SCHEDULED_REMINDER | subjects::SCHEDULED_START => {
            let event: ScheduledRoundEvent = message.decode()?;
            let outcome = round_service::handle_scheduled_event(state, event).await?;
            debug!(round_id = %event.round_id, kind = ?event.kind, ?outcome, "scheduled event handled");
        }
        subjects::COMMAND_CREATE => {
            let command: CreateRoundCommand = message.decode()?;
            round_service::create_round(state, command.into()).await?;
        }
        subjects::COMMAND_JOIN => {
            let command: JoinRoundCommand = message.decode()?;
            // The tag resolution keeps running after the receipt is dropped.
            round_service::join_round(state, command.round_id, command.user_id, command.response)
                .await?;
        }
        subjects::COMMAND_SUBMIT_SCORE => {
            let command: SubmitScoreCommand = message.decode()?;
            round_service::submit_score(state, command.round_id, command.user_id, command.score)
                .await?;
        }
        subjects::COMMAND_EDIT => {
            let command: EditRoundCommand = message.decode()?;
            let update = command.update();
            round_service::edit_round(state, command.round_id, command.requestor, update).await?;
        }
        subjects::COMMAND_DELETE => {
            let command: RoundCommand = message.decode()?;
            round_service::delete_round(state, command.round_id).await?;
        }
        subjects::COMMAND_FINALIZE => {
            let command: RoundCommand = message.decode()?;
            round_service::finalize_round(state, command.round_id).await?;
        }
        other => return Err(ConsumerError::UnknownSubject(other.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        bus::{
            MessageBus,
            memory::{InMemoryBus, RedeliveryPolicy},
        },
        scheduler::ScheduledKind,
        services::test_support::{Harness, START},
        state::{round::RoundId, state_machine::RoundPhase},
    };

    /// Bus the test deliveries travel on, independent from the harness bus.
    fn delivery_bus() -> InMemoryBus {
        InMemoryBus::with_redelivery(RedeliveryPolicy {
            delay: Duration::from_millis(10),
            max_deliveries: 3,
        })
    }

    async fn deliver(bus: &InMemoryBus, subject: &str, payload: serde_json::Value) -> Subscription {
        let subscription = bus.subscribe(subject).await.unwrap();
        bus.publish(Message::json(subject, &payload).unwrap())
            .await
            .unwrap();
        subscription
    }

    async fn redelivered(subscription: &mut Subscription) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_millis(200), subscription.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn scheduled_start_message_starts_the_round() {
        let h = Harness::new().await;
        let round = h.create().await;
        let bus = delivery_bus();
        let event = ScheduledRoundEvent {
            round_id: round.id,
            kind: ScheduledKind::Start,
            start_time: START,
        };
        let mut subscription =
            deliver(&bus, subjects::SCHEDULED_START, serde_json::to_value(event).unwrap()).await;

        handle_delivery(&h.state, subscription.recv().await.unwrap()).await;

        assert_eq!(h.round(round.id).await.phase, RoundPhase::Finalized);
        assert!(redelivered(&mut subscription).await.is_none());
    }

    #[tokio::test]
    async fn join_command_adds_participant() {
        let h = Harness::new().await;
        let round = h.create().await;
        let bus = delivery_bus();
        let mut subscription = deliver(
            &bus,
            subjects::COMMAND_JOIN,
            json!({ "round_id": round.id, "user_id": "bob", "response": "accepted" }),
        )
        .await;

        handle_delivery(&h.state, subscription.recv().await.unwrap()).await;

        let round = h.round(round.id).await;
        assert!(round.participant(&"bob".into()).is_some());
    }

    #[tokio::test]
    async fn undecodable_payloads_are_acked() {
        let h = Harness::new().await;
        let bus = delivery_bus();
        let mut subscription =
            deliver(&bus, subjects::COMMAND_JOIN, json!({ "unexpected": true })).await;

        handle_delivery(&h.state, subscription.recv().await.unwrap()).await;

        assert!(redelivered(&mut subscription).await.is_none());
    }

    #[tokio::test]
    async fn permanent_failures_are_acked() {
        let h = Harness::new().await;
        let bus = delivery_bus();
        let mut subscription = deliver(
            &bus,
            subjects::COMMAND_FINALIZE,
            json!({ "round_id": RoundId(404) }),
        )
        .await;

        handle_delivery(&h.state, subscription.recv().await.unwrap()).await;

        assert!(redelivered(&mut subscription).await.is_none());
    }

    #[tokio::test]
    async fn transient_failures_are_redelivered() {
        let h = Harness::new().await;
        let round = h.create().await;
        h.store.set_offline(true);
        let bus = delivery_bus();
        let mut subscription = deliver(
            &bus,
            subjects::COMMAND_DELETE,
            json!({ "round_id": round.id }),
        )
        .await;

        handle_delivery(&h.state, subscription.recv().await.unwrap()).await;

        h.store.set_offline(false);
        let retry = redelivered(&mut subscription).await.unwrap();
        assert_eq!(retry.attempt(), 2);
        handle_delivery(&h.state, retry).await;

        assert_eq!(h.round(round.id).await.phase, RoundPhase::Deleted);
        assert!(redelivered(&mut subscription).await.is_none());
    }

    #[tokio::test]
    async fn spawned_consumers_handle_bus_commands() {
        let h = Harness::new().await;
        let round = h.create().await;
        spawn_consumers(h.state.clone()).await.unwrap();

        h.bus
            .publish(Message::json(subjects::COMMAND_DELETE, &json!({ "round_id": round.id })).unwrap())
            .await
            .unwrap();

        let mut phase = RoundPhase::Upcoming;
        for _ in 0..50 {
            phase = h.round(round.id).await.phase;
            if phase == RoundPhase::Deleted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(phase, RoundPhase::Deleted);
    }
}
