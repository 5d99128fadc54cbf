use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{match_store::MatchStore, storage::StorageError},
    state::{SharedState, matches::MatchState},
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                restore_matches(&state, store.as_ref()).await;
                state.install_match_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !watch_store(&state, store.as_ref()).await {
                    warn!("exhausted storage reconnect attempts; staying in degraded mode");
                    state.clear_match_store().await;
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store until it stays unreachable after [`MAX_RECONNECT_ATTEMPTS`].
/// Returns `false` once the store is given up on.
async fn watch_store(state: &SharedState, store: &dyn MatchStore) -> bool {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(health_err) => {
                warn!(error = %health_err, "storage health check failed");
                if !reconnect(state, store).await {
                    return false;
                }
                state.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn MatchStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(reconnect_err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %reconnect_err,
                        "storage reconnect first attempt failed; entering in degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

/// Load stored matches into the registry. Matches already live in memory are
/// kept as they are.
pub async fn restore_matches(state: &SharedState, store: &dyn MatchStore) {
    match store.list_matches().await {
        Ok(entities) => {
            let total = entities.len();
            let restored = entities
                .into_iter()
                .map(|entity| state.matches().restore(MatchState::from(entity)))
                .filter(|restored| *restored)
                .count();
            info!(total, restored, "stored matches loaded");
        }
        Err(err) => warn!(error = %err, "failed to load stored matches"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::memory::MemoryMatchStore, models::MatchEntity,
            scoring::fake::FakeGateway,
        },
        state::AppState,
    };

    #[tokio::test]
    async fn stored_matches_do_not_override_live_ones() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
        let live = state.matches().create(Vec::new());
        let store = MemoryMatchStore::new();

        let mut stale = MatchEntity::from(&live);
        stale.version = 42;
        store.save_match(stale).await.unwrap();
        let mut other = MatchEntity::from(&live);
        other.id = uuid::Uuid::new_v4();
        store.save_match(other.clone()).await.unwrap();

        restore_matches(&state, &store).await;

        assert_eq!(state.matches().get(live.id()).unwrap().version(), 0);
        assert!(state.matches().get(other.id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_installs_store_and_restores_matches() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
        let store = Arc::new(MemoryMatchStore::new());
        let seeded = {
            let scratch = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
            MatchEntity::from(&scratch.matches().create(Vec::new()))
        };
        store.save_match(seeded.clone()).await.unwrap();

        let supervised = store.clone();
        let handle = tokio::spawn(run(state.clone(), move || {
            let store: Arc<dyn MatchStore> = supervised.clone();
            async move { Ok(store) }
        }));
        sleep(Duration::from_millis(10)).await;

        assert!(!state.is_degraded());
        assert!(state.matches().get(seeded.id).is_ok());
        handle.abort();
    }
}
