/// Live match registry.
pub mod matches;
/// Fan-out of match changes to observers.
pub mod sync;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{match_store::MatchStore, scoring::ScoringGateway},
    error::ServiceError,
    services::attempt_workflow::QualifierWorkflow,
};

pub use self::matches::{MatchError, MatchRegistry};
pub use self::sync::{MatchSyncBroadcaster, ObserverId, ObserverRole, Subscription, SyncMessage};

/// Reference-counted handle to [`AppState`] shared by handlers.
pub type SharedState = Arc<AppState>;

/// Central application state: the qualifier workflow, live matches, observer
/// subscriptions and the storage handle.
pub struct AppState {
    config: AppConfig,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    sync: Arc<MatchSyncBroadcaster>,
    matches: MatchRegistry,
    qualifier: QualifierWorkflow,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, gateway: Arc<dyn ScoringGateway>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let sync = Arc::new(MatchSyncBroadcaster::new(config.sync.subscriber_buffer));
        Arc::new(Self {
            config,
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            matches: MatchRegistry::new(sync.clone()),
            sync,
            qualifier: QualifierWorkflow::new(gateway),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Observer subscriptions.
    pub fn sync(&self) -> &MatchSyncBroadcaster {
        &self.sync
    }

    /// Live matches.
    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    /// Qualifier attempt workflow.
    pub fn qualifier(&self) -> &QualifierWorkflow {
        &self.qualifier
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current match store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        {
            let mut guard = self.match_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        {
            let mut guard = self.match_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{match_store::memory::MemoryMatchStore, scoring::fake::FakeGateway};

    #[tokio::test]
    async fn installing_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(FakeGateway::new()));
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(
            state.require_match_store().await,
            Err(ServiceError::Degraded)
        ));

        state.install_match_store(Arc::new(MemoryMatchStore::new())).await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());

        state.clear_match_store().await;
        assert!(state.is_degraded());
        assert!(state.match_store().await.is_none());
    }
}
