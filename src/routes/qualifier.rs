use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::qualifier::{
        AttemptRecord, AttemptResponse, RemainingAttemptsRequest, RemainingAttemptsResponse,
        StartAttemptRequest, SubmitAttemptRequest,
    },
    error::AppError,
    services::qualifier_service,
    state::SharedState,
};

/// Routes driving qualifier attempts.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/qualifier/attempts", post(start_attempt))
        .route("/qualifier/attempts/remaining", post(remaining_attempts))
        .route("/qualifier/attempts/submit", post(submit_attempt))
        .route(
            "/qualifier/subjects/{subject_id}/attempts",
            get(attempt_history),
        )
}

/// Ask the scoring authority how many attempts a player has left on a level.
#[utoipa::path(
    post,
    path = "/qualifier/attempts/remaining",
    tag = "qualifier",
    request_body = RemainingAttemptsRequest,
    responses(
        (status = 200, description = "Remaining attempts", body = RemainingAttemptsResponse),
        (status = 401, description = "Player could not be authenticated"),
        (status = 404, description = "Level unknown to the scoring authority"),
        (status = 502, description = "Scoring authority failure")
    )
)]
pub async fn remaining_attempts(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<RemainingAttemptsRequest>>,
) -> Result<Json<RemainingAttemptsResponse>, AppError> {
    Ok(Json(
        qualifier_service::remaining_attempts(&state, payload).await?,
    ))
}

/// Open a qualifier attempt by creating its score row upstream.
#[utoipa::path(
    post,
    path = "/qualifier/attempts",
    tag = "qualifier",
    request_body = StartAttemptRequest,
    responses(
        (status = 200, description = "Attempt opened", body = AttemptResponse),
        (status = 404, description = "Level unknown to the scoring authority"),
        (status = 409, description = "Attempt already open or none remaining"),
        (status = 502, description = "Scoring authority failure")
    )
)]
pub async fn start_attempt(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartAttemptRequest>>,
) -> Result<Json<AttemptResponse>, AppError> {
    Ok(Json(qualifier_service::start_attempt(&state, payload).await?))
}

/// Submit the final score of the open attempt.
#[utoipa::path(
    post,
    path = "/qualifier/attempts/submit",
    tag = "qualifier",
    request_body = SubmitAttemptRequest,
    responses(
        (status = 200, description = "Score submitted", body = AttemptResponse),
        (status = 409, description = "No open attempt"),
        (status = 502, description = "Scoring authority failure")
    )
)]
pub async fn submit_attempt(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SubmitAttemptRequest>>,
) -> Result<Json<AttemptResponse>, AppError> {
    Ok(Json(
        qualifier_service::submit_attempt(&state, payload).await?,
    ))
}

/// List the recorded attempts of a player.
#[utoipa::path(
    get,
    path = "/qualifier/subjects/{subject_id}/attempts",
    tag = "qualifier",
    params(("subject_id" = String, Path, description = "Player identifier")),
    responses(
        (status = 200, description = "Recorded attempts, oldest first", body = [AttemptRecord]),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn attempt_history(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<AttemptRecord>>, AppError> {
    Ok(Json(
        qualifier_service::attempt_history(&state, subject_id).await?,
    ))
}
