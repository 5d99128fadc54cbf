use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report storage connectivity and live counters.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let matches = state.matches().len();
    let observers = state.sync().subscriber_count();
    if state.is_degraded() {
        HealthResponse::degraded(matches, observers)
    } else {
        HealthResponse::ok(matches, observers)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{match_store::memory::MemoryMatchStore, scoring::fake::FakeGateway},
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
        state.matches().create(Vec::new());

        let before = health_status(&state).await;
        assert_eq!(before.status, "degraded");
        assert_eq!(before.matches, 1);

        state.install_match_store(Arc::new(MemoryMatchStore::new())).await;
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
