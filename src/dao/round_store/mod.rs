pub mod memory;

use crate::dao::models::{NewRoundEntity, RoundEntity};
use crate::dao::storage::StorageResult;
use crate::state::round::RoundId;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer for rounds.
///
/// Reads reflect the latest committed save for a round. `save_round` is a
/// compare-and-swap on [`RoundEntity::version`]: it fails with
/// [`StorageError::VersionConflict`](crate::dao::storage::StorageError::VersionConflict)
/// when the stored version differs, and returns the entity with its bumped version.
pub trait RoundStore: Send + Sync {
    fn create_round(&self, round: NewRoundEntity) -> BoxFuture<'static, StorageResult<RoundEntity>>;
    fn find_round(&self, id: RoundId) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    fn save_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<RoundEntity>>;
    /// Physically remove a round. Only used to roll back a failed creation.
    fn remove_round(&self, id: RoundId) -> BoxFuture<'static, StorageResult<bool>>;
    fn list_rounds(&self) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
