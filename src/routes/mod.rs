use axum::Router;

use crate::state::SharedState;

/// OpenAPI document and Swagger UI.
pub mod docs;
/// Liveness and storage health.
pub mod health;
/// Match lifecycle endpoints.
pub mod matches;
/// Qualifier command endpoints.
pub mod qualifier;
/// Server-Sent Events observer stream.
pub mod sse;
/// WebSocket observer channel.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(websocket::router())
        .merge(qualifier::router())
        .merge(matches::router());

    api_router.merge(docs::router()).with_state(state)
}
