//! End-to-end lifecycle over the in-memory bus, with real delayed delivery.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde_json::json;
use time::OffsetDateTime;

use round_coordinator::{
    bus::{Message, MessageBus, Subscription, memory::InMemoryBus, subjects},
    config::AppConfig,
    dao::round_store::memory::InMemoryRoundStore,
    dto::events::{FinalizedRound, RoundReminderEvent, RoundStartedEvent},
    gateway::{
        ROLE_LOOKUP_ROUTE, RequestGateway, TAG_NUMBER_ROUTE,
        lookups::{GatewayLookups, UserRole},
        responder::serve_lookups,
    },
    scheduler::{BusScheduler, ReminderOffsets},
    services::{consumers, round_service},
    state::{
        AppState, Dependencies, SharedState,
        clock::SystemClock,
        round::{ParticipantResponse, RoundDraft, RoundId, RoundUpdate, TagNumber, UserId},
        state_machine::RoundPhase,
    },
};

const WAIT: Duration = Duration::from_secs(5);

struct Coordinator {
    state: SharedState,
    bus: InMemoryBus,
}

async fn coordinator() -> Coordinator {
    let bus = InMemoryBus::new();
    let handle: Arc<dyn MessageBus> = Arc::new(bus.clone());

    let tags = Arc::new(DashMap::from_iter([(UserId::from("bob"), TagNumber(7))]));
    let roles = Arc::new(DashMap::from_iter([(UserId::from("ed"), UserRole::Editor)]));
    serve_lookups(handle.clone(), TAG_NUMBER_ROUTE, tags)
        .await
        .unwrap();
    serve_lookups(handle.clone(), ROLE_LOOKUP_ROUTE, roles)
        .await
        .unwrap();

    let config = AppConfig {
        gateway_timeout: Duration::from_millis(500),
        reminders: ReminderOffsets {
            one_hour: time::Duration::milliseconds(600),
            thirty_minutes: time::Duration::milliseconds(300),
        },
        ..AppConfig::default()
    };
    let lookups = Arc::new(GatewayLookups::new(RequestGateway::new(
        handle.clone(),
        config.gateway_timeout,
    )));
    let state = AppState::new(
        config,
        Dependencies {
            store: Arc::new(InMemoryRoundStore::new()),
            bus: handle.clone(),
            scheduler: Arc::new(BusScheduler::new(handle)),
            tags: lookups.clone(),
            roles: lookups,
            clock: Arc::new(SystemClock),
        },
    );
    consumers::spawn_consumers(state.clone()).await.unwrap();

    Coordinator { state, bus }
}

impl Coordinator {
    async fn create(&self, starts_in: time::Duration) -> RoundId {
        let draft = RoundDraft {
            title: "Evening doubles".into(),
            description: None,
            location: Some("Lakeside".into()),
            event_type: Some("casual".into()),
            start_time: OffsetDateTime::now_utc() + starts_in,
            created_by: "alice".into(),
        };
        round_service::create_round(&self.state, draft)
            .await
            .unwrap()
            .id
    }

    async fn join(&self, round_id: RoundId, user: &str) {
        let receipt = round_service::join_round(
            &self.state,
            round_id,
            user.into(),
            ParticipantResponse::Accepted,
        )
        .await
        .unwrap();
        if let Some(resolution) = receipt.tag_resolution {
            resolution.await.unwrap();
        }
    }

    async fn command(&self, subject: &str, payload: serde_json::Value) {
        self.bus
            .publish(Message::json(subject, &payload).unwrap())
            .await
            .unwrap();
    }

    async fn phase(&self, round_id: RoundId) -> RoundPhase {
        round_service::get_round(&self.state, round_id)
            .await
            .unwrap()
            .phase
    }
}

async fn next(subscription: &mut Subscription, within: Duration) -> Option<Message> {
    let delivery = tokio::time::timeout(within, subscription.recv())
        .await
        .ok()??;
    let message = delivery.message().clone();
    delivery.ack();
    Some(message)
}

#[tokio::test]
async fn scheduled_round_runs_to_a_single_finalization() {
    let app = coordinator().await;
    let mut reminders = app.bus.subscribe(subjects::ROUND_REMINDER_ONE_HOUR).await.unwrap();
    let mut started = app.bus.subscribe(subjects::ROUND_STARTED).await.unwrap();
    let mut finalized = app
        .bus
        .subscribe(subjects::LEADERBOARD_ROUND_FINALIZED)
        .await
        .unwrap();

    let round_id = app.create(time::Duration::milliseconds(900)).await;
    app.join(round_id, "bob").await;
    app.join(round_id, "carol").await;

    let reminder: RoundReminderEvent = next(&mut reminders, WAIT)
        .await
        .expect("one hour reminder")
        .decode()
        .unwrap();
    assert_eq!(reminder.round_id, round_id);
    assert_eq!(reminder.participants, [UserId::from("bob"), UserId::from("carol")]);

    let start: RoundStartedEvent = next(&mut started, WAIT)
        .await
        .expect("round started")
        .decode()
        .unwrap();
    assert_eq!(start.round_id, round_id);
    assert_eq!(app.phase(round_id).await, RoundPhase::InProgress);

    app.command(
        subjects::COMMAND_SUBMIT_SCORE,
        json!({ "round_id": round_id, "user_id": "bob", "score": 72 }),
    )
    .await;
    app.command(
        subjects::COMMAND_SUBMIT_SCORE,
        json!({ "round_id": round_id, "user_id": "carol", "score": 75 }),
    )
    .await;

    let published: FinalizedRound = next(&mut finalized, WAIT)
        .await
        .expect("finalized round")
        .decode()
        .unwrap();
    assert_eq!(published.round_id, round_id);
    let entries: Vec<_> = published
        .entries
        .iter()
        .map(|entry| (entry.user_id.as_str(), entry.tag_number, entry.score))
        .collect();
    assert_eq!(
        entries,
        [("bob", Some(TagNumber(7)), 72), ("carol", None, 75)]
    );

    app.command(subjects::COMMAND_FINALIZE, json!({ "round_id": round_id }))
        .await;
    assert!(next(&mut finalized, Duration::from_millis(300)).await.is_none());
    assert_eq!(app.phase(round_id).await, RoundPhase::Finalized);
}

#[tokio::test]
async fn rescheduled_round_ignores_its_old_start() {
    let app = coordinator().await;
    let mut started = app.bus.subscribe(subjects::ROUND_STARTED).await.unwrap();

    let round_id = app.create(time::Duration::milliseconds(700)).await;
    app.join(round_id, "bob").await;

    let new_start = OffsetDateTime::now_utc() + time::Duration::milliseconds(1_600);
    round_service::edit_round(
        &app.state,
        round_id,
        "ed".into(),
        RoundUpdate {
            start_time: Some(new_start),
            ..RoundUpdate::default()
        },
    )
    .await
    .unwrap();

    // The original start passes without effect.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(app.phase(round_id).await, RoundPhase::Upcoming);

    assert!(next(&mut started, WAIT).await.is_some());
    assert_eq!(app.phase(round_id).await, RoundPhase::InProgress);
    assert!(next(&mut started, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn deleted_round_never_starts() {
    let app = coordinator().await;
    let mut started = app.bus.subscribe(subjects::ROUND_STARTED).await.unwrap();

    let round_id = app.create(time::Duration::milliseconds(400)).await;
    app.join(round_id, "bob").await;
    app.command(subjects::COMMAND_DELETE, json!({ "round_id": round_id }))
        .await;

    assert!(next(&mut started, Duration::from_millis(1_200)).await.is_none());
    assert_eq!(app.phase(round_id).await, RoundPhase::Deleted);
}
