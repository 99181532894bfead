use serde::Serialize;
use utoipa::ToSchema;

/// Overall coordinator status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Everything answers.
    Ok,
    /// The round store does not answer; commands fail until it recovers.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Whether the round store answered the probe.
    pub store_reachable: bool,
    /// Rounds with a lock entry, busy or idle since the last prune.
    pub tracked_round_locks: usize,
}

impl HealthResponse {
    /// Build the response from the store probe outcome.
    pub fn new(store_reachable: bool, tracked_round_locks: usize) -> Self {
        let status = if store_reachable {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            store_reachable,
            tracked_round_locks,
        }
    }
}
