//! qualifier-coord binary entrypoint wiring the scoring gateway, match storage,
//! REST, WebSocket and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qualifier_coord::{
    config::AppConfig,
    dao::{match_store::memory::MemoryMatchStore, scoring::graphql::GraphQlScoringGateway},
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let gateway =
        GraphQlScoringGateway::new(&config.scoring).context("building scoring HTTP client")?;
    let app_state = AppState::new(config, Arc::new(gateway));

    start_storage(app_state.clone()).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Supervise CouchDB when it is configured, otherwise keep matches and
/// attempts in memory.
#[cfg(feature = "couch-store")]
async fn start_storage(state: SharedState) {
    use qualifier_coord::{
        dao::{
            match_store::{
                MatchStore,
                couchdb::{CouchConfig, CouchMatchStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };
    use tracing::warn;

    match CouchConfig::from_env() {
        Ok(Some(couch)) => {
            info!(base_url = %couch.base_url, database = %couch.database, "using CouchDB match store");
            tokio::spawn(storage_supervisor::run(state, move || {
                let couch = couch.clone();
                async move {
                    let store = CouchMatchStore::connect(couch)
                        .await
                        .map_err(StorageError::from)?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
        }
        Ok(None) => install_memory_store(&state).await,
        Err(err) => {
            warn!(error = %err, "invalid CouchDB configuration; falling back to memory store");
            install_memory_store(&state).await;
        }
    }
}

#[cfg(not(feature = "couch-store"))]
async fn start_storage(state: SharedState) {
    install_memory_store(&state).await;
}

async fn install_memory_store(state: &SharedState) {
    info!("using in-memory match store");
    state
        .install_match_store(Arc::new(MemoryMatchStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
