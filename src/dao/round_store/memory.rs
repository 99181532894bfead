use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
    dao::{
        models::{NewRoundEntity, RoundEntity},
        round_store::RoundStore,
        storage::{StorageError, StorageResult},
    },
    state::round::RoundId,
};

/// Failure reported while the in-memory store is switched offline.
#[derive(Debug, Error)]
#[error("in-memory round store is offline")]
pub struct StoreOffline;

/// Process-local [`RoundStore`] keeping every round in a sorted map.
#[derive(Clone, Default)]
pub struct InMemoryRoundStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rounds: RwLock<BTreeMap<RoundId, RoundEntity>>,
    last_id: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryRoundStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails with [`StorageError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }
}

impl Inner {
    fn ensure_online(&self, operation: &str) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                format!("{operation} failed"),
                StoreOffline,
            ))
        } else {
            Ok(())
        }
    }
}

impl RoundStore for InMemoryRoundStore {
    fn create_round(&self, round: NewRoundEntity) -> BoxFuture<'static, StorageResult<RoundEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("create round")?;
            let id = RoundId(inner.last_id.fetch_add(1, Ordering::SeqCst) + 1);
            let entity = round.into_entity(id);
            inner.rounds.write().await.insert(id, entity.clone());
            Ok(entity)
        })
    }

    fn find_round(&self, id: RoundId) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("find round")?;
            Ok(inner.rounds.read().await.get(&id).cloned())
        })
    }

    fn save_round(&self, mut round: RoundEntity) -> BoxFuture<'static, StorageResult<RoundEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("save round")?;
            let mut rounds = inner.rounds.write().await;
            let stored = rounds
                .get_mut(&round.id)
                .ok_or(StorageError::NotFound { id: round.id })?;

            if stored.version != round.version {
                return Err(StorageError::VersionConflict {
                    id: round.id,
                    expected: round.version,
                    actual: stored.version,
                });
            }

            round.version += 1;
            *stored = round.clone();
            Ok(round)
        })
    }

    fn remove_round(&self, id: RoundId) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("remove round")?;
            Ok(inner.rounds.write().await.remove(&id).is_some())
        })
    }

    fn list_rounds(&self) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online("list rounds")?;
            Ok(inner.rounds.read().await.values().cloned().collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online("health check") })
    }
}
