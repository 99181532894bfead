use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the round store and report lock bookkeeping.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_reachable = match state.store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "round store health check failed");
            false
        }
    };
    HealthResponse::new(store_reachable, state.locks().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dto::health::HealthStatus, services::test_support::Harness};

    #[tokio::test]
    async fn store_outage_is_reported_as_degraded() {
        let h = Harness::without_responders();
        assert_eq!(health_status(&h.state).await.status, HealthStatus::Ok);

        h.store.set_offline(true);
        let health = health_status(&h.state).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.store_reachable);
    }
}
