use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{
        CreateMatchRequest, MatchSnapshot, PlayRequest, PlayResponse, UpdateMatchRequest,
    },
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Routes managing live matches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route(
            "/matches/{id}",
            get(get_match).patch(update_match).delete(delete_match),
        )
        .route("/matches/{id}/play", post(play_match))
}

/// List every live match.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Live matches", body = [MatchSnapshot]))
)]
pub async fn list_matches(State(state): State<SharedState>) -> Json<Vec<MatchSnapshot>> {
    Json(match_service::list_matches(&state))
}

/// Fetch one match.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match", body = MatchSnapshot),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(match_service::get_match(&state, id)?))
}

/// Open a match and announce it to observers.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    responses((status = 200, description = "Match created", body = MatchSnapshot))
)]
pub async fn create_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(match_service::create_match(&state, payload).await?))
}

/// Change the roster or selection of a match.
#[utoipa::path(
    patch,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    request_body = UpdateMatchRequest,
    responses(
        (status = 200, description = "Match after the change", body = MatchSnapshot),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Selection does not fit the selected song")
    )
)]
pub async fn update_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateMatchRequest>>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        match_service::update_match(&state, id, payload).await?,
    ))
}

/// Close a match.
#[utoipa::path(
    delete,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match removed", body = MatchSnapshot),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn delete_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(match_service::delete_match(&state, id).await?))
}

/// Ask the players of a match to start its selected level.
#[utoipa::path(
    post,
    path = "/matches/{id}/play",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Command sent", body = PlayResponse),
        (status = 400, description = "Target outside the match"),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Selection incomplete")
    )
)]
pub async fn play_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<PlayRequest>>,
) -> Result<Json<PlayResponse>, AppError> {
    Ok(Json(match_service::play_match(&state, id, payload)?))
}
