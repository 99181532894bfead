pub mod clock;
pub mod locks;
pub mod round;
pub mod state_machine;
pub mod transitions;

use std::sync::Arc;

use crate::{
    bus::MessageBus,
    config::AppConfig,
    dao::round_store::RoundStore,
    error::ServiceError,
    gateway::lookups::{RoleLookup, TagLookup},
    scheduler::Scheduler,
};

use self::{clock::Clock, locks::RoundLocks, round::RoundId};

pub use self::transitions::LockedRound;

pub type SharedState = Arc<AppState>;

/// Collaborators the coordinator is wired with.
pub struct Dependencies {
    /// Round persistence.
    pub store: Arc<dyn RoundStore>,
    /// Outbound publications and command subscriptions.
    pub bus: Arc<dyn MessageBus>,
    /// Delayed delivery of lifecycle events.
    pub scheduler: Arc<dyn Scheduler>,
    /// Ranking tag resolution.
    pub tags: Arc<dyn TagLookup>,
    /// Permission role resolution.
    pub roles: Arc<dyn RoleLookup>,
    /// Source of "now".
    pub clock: Arc<dyn Clock>,
}

/// Central application state shared by routes, consumers and services.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RoundStore>,
    bus: Arc<dyn MessageBus>,
    scheduler: Arc<dyn Scheduler>,
    tags: Arc<dyn TagLookup>,
    roles: Arc<dyn RoleLookup>,
    clock: Arc<dyn Clock>,
    locks: RoundLocks,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, deps: Dependencies) -> SharedState {
        let Dependencies {
            store,
            bus,
            scheduler,
            tags,
            roles,
            clock,
        } = deps;

        Arc::new(Self {
            config,
            store,
            bus,
            scheduler,
            tags,
            roles,
            clock,
            locks: RoundLocks::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RoundStore {
        self.store.as_ref()
    }

    pub fn bus(&self) -> &dyn MessageBus {
        self.bus.as_ref()
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn tags(&self) -> &dyn TagLookup {
        self.tags.as_ref()
    }

    pub fn roles(&self) -> &dyn RoleLookup {
        self.roles.as_ref()
    }

    pub fn locks(&self) -> &RoundLocks {
        &self.locks
    }

    /// Current instant according to the configured clock.
    pub fn now(&self) -> time::OffsetDateTime {
        self.clock.now()
    }

    /// Take the round's lock and load its latest committed state.
    ///
    /// `Ok(None)` when the round does not exist; the lock is released in that case.
    pub async fn lock_round(&self, id: RoundId) -> Result<Option<LockedRound>, ServiceError> {
        let guard = self.locks.lock(id).await;
        let entity = self.store.find_round(id).await?;
        Ok(entity.map(|entity| LockedRound::new(entity.into(), guard)))
    }
}
