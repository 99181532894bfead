//! Wiring shared by the orchestrator and consumer tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use time::{OffsetDateTime, macros::datetime};

use crate::{
    bus::{BusError, BusResult, Message, MessageBus, Subscription, memory::InMemoryBus},
    config::AppConfig,
    dao::round_store::memory::InMemoryRoundStore,
    gateway::{
        ROLE_LOOKUP_ROUTE, RequestGateway, TAG_NUMBER_ROUTE,
        lookups::{GatewayLookups, UserRole},
        responder::{Directory, serve_lookups},
    },
    scheduler::testing::RecordingScheduler,
    services::round_service,
    state::{
        AppState, Dependencies, SharedState,
        clock::ManualClock,
        round::{ParticipantResponse, Round, RoundDraft, RoundId, TagNumber, UserId},
    },
};

/// Frozen "now" of every harness.
pub const NOW: OffsetDateTime = datetime!(2026-05-01 10:00 UTC);
/// Default start of rounds created through [`Harness::create`].
pub const START: OffsetDateTime = datetime!(2026-05-01 12:00 UTC);
/// Creator of rounds created through [`Harness::create`].
pub const CREATOR: &str = "alice";

/// Bus wrapper whose publications on selected subjects fail on demand.
pub struct FlakyBus {
    inner: InMemoryBus,
    failing: Mutex<HashSet<String>>,
}

impl FlakyBus {
    pub fn new(inner: InMemoryBus) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make publications on `subject` fail (`true`) or succeed again (`false`).
    pub fn fail_subject(&self, subject: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(subject.to_string());
        } else {
            set.remove(subject);
        }
    }

    fn is_failing(&self, subject: &str) -> bool {
        self.failing.lock().unwrap().contains(subject)
    }
}

impl MessageBus for FlakyBus {
    fn publish(&self, message: Message) -> BoxFuture<'static, BusResult<()>> {
        if self.is_failing(&message.subject) {
            return Box::pin(async { Err(BusError::Closed) });
        }
        self.inner.publish(message)
    }

    fn publish_at(
        &self,
        deliver_at: OffsetDateTime,
        message: Message,
    ) -> BoxFuture<'static, BusResult<()>> {
        if self.is_failing(&message.subject) {
            return Box::pin(async { Err(BusError::Closed) });
        }
        self.inner.publish_at(deliver_at, message)
    }

    fn subscribe(&self, subject: &str) -> BoxFuture<'static, BusResult<Subscription>> {
        self.inner.subscribe(subject)
    }
}

/// A fully wired coordinator over in-memory collaborators.
pub struct Harness {
    pub state: SharedState,
    pub bus: InMemoryBus,
    pub flaky: Arc<FlakyBus>,
    pub store: InMemoryRoundStore,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
    pub tags: Directory<TagNumber>,
    pub roles: Directory<UserRole>,
}

impl Harness {
    /// Harness whose tag and role lookups are answered from [`Harness::tags`] and [`Harness::roles`].
    pub async fn new() -> Self {
        let harness = Self::without_responders();
        let bus: Arc<dyn MessageBus> = Arc::new(harness.bus.clone());
        serve_lookups(bus.clone(), TAG_NUMBER_ROUTE, harness.tags.clone())
            .await
            .unwrap();
        serve_lookups(bus, ROLE_LOOKUP_ROUTE, harness.roles.clone())
            .await
            .unwrap();
        harness
    }

    /// Harness where nobody answers lookups, so every lookup times out.
    pub fn without_responders() -> Self {
        let bus = InMemoryBus::new();
        let flaky = Arc::new(FlakyBus::new(bus.clone()));
        let store = InMemoryRoundStore::new();
        let scheduler = Arc::new(RecordingScheduler::default());
        let clock = Arc::new(ManualClock::new(NOW));
        let config = AppConfig {
            gateway_timeout: Duration::from_millis(200),
            ..AppConfig::default()
        };

        let gateway = RequestGateway::new(Arc::new(bus.clone()), config.gateway_timeout);
        let lookups = Arc::new(GatewayLookups::new(gateway));
        let state = AppState::new(
            config,
            Dependencies {
                store: Arc::new(store.clone()),
                bus: flaky.clone(),
                scheduler: scheduler.clone(),
                tags: lookups.clone(),
                roles: lookups,
                clock: clock.clone(),
            },
        );

        Self {
            state,
            bus,
            flaky,
            store,
            scheduler,
            clock,
            tags: Arc::new(DashMap::new()),
            roles: Arc::new(DashMap::new()),
        }
    }

    pub fn draft(&self, title: &str, start_time: OffsetDateTime) -> RoundDraft {
        RoundDraft {
            title: title.to_string(),
            description: None,
            location: Some("Pine Hill".to_string()),
            event_type: None,
            start_time,
            created_by: CREATOR.into(),
        }
    }

    /// Create a round starting at [`START`].
    pub async fn create(&self) -> Round {
        round_service::create_round(&self.state, self.draft("Sunday round", START))
            .await
            .unwrap()
    }

    /// Join and wait for the background tag resolution to settle.
    pub async fn join(&self, round_id: RoundId, user: &str, response: ParticipantResponse) {
        let receipt = round_service::join_round(&self.state, round_id, user.into(), response)
            .await
            .unwrap();
        if let Some(resolution) = receipt.tag_resolution {
            resolution.await.unwrap();
        }
    }

    pub async fn round(&self, round_id: RoundId) -> Round {
        round_service::get_round(&self.state, round_id).await.unwrap()
    }

    pub fn set_tag(&self, user: &str, tag: u32) {
        self.tags.insert(UserId::from(user), TagNumber(tag));
    }

    pub fn set_role(&self, user: &str, role: UserRole) {
        self.roles.insert(UserId::from(user), role);
    }

    pub async fn subscribe(&self, subject: &str) -> Subscription {
        self.bus.subscribe(subject).await.unwrap()
    }
}

/// Next message on `subscription`, or `None` if nothing arrives shortly.
pub async fn next_message(subscription: &mut Subscription) -> Option<Message> {
    let delivery = tokio::time::timeout(Duration::from_millis(100), subscription.recv())
        .await
        .ok()??;
    let message = delivery.message().clone();
    delivery.ack();
    Some(message)
}
