use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/matches",
    tag = "observers",
    responses((status = 200, description = "Match changes as server-sent events", content_type = "text/event-stream", body = String))
)]
/// Stream match changes to read-only observers.
pub async fn match_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let subscription = sse_service::subscribe(&state);
    sse_service::to_sse_stream(&state, subscription)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/matches", get(match_stream))
}
