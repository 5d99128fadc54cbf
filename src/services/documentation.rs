use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the qualifier coordinator.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::qualifier::remaining_attempts,
        crate::routes::qualifier::start_attempt,
        crate::routes::qualifier::submit_attempt,
        crate::routes::qualifier::attempt_history,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::create_match,
        crate::routes::matches::update_match,
        crate::routes::matches::delete_match,
        crate::routes::matches::play_match,
        crate::routes::sse::match_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::dto::health::HealthResponse,
            crate::dto::qualifier::LevelInput,
            crate::dto::qualifier::RemainingAttemptsRequest,
            crate::dto::qualifier::StartAttemptRequest,
            crate::dto::qualifier::SubmitAttemptRequest,
            crate::dto::qualifier::LevelSummary,
            crate::dto::qualifier::RemainingAttemptsResponse,
            crate::dto::qualifier::AttemptResponse,
            crate::dto::qualifier::AttemptRecord,
            crate::dto::matches::MatchSnapshot,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::UpdateMatchRequest,
            crate::dto::matches::PlayRequest,
            crate::dto::matches::PlayResponse,
            crate::dto::ws::ObserverInboundMessage,
            crate::dto::ws::ObserverOutboundMessage,
            crate::dao::scoring::Difficulty,
            crate::state::ObserverRole,
            crate::state::matches::SelectedSong,
            crate::state::matches::Characteristic,
            crate::state::matches::PlaySong,
            crate::state::matches::GameplayModifier,
            crate::state::matches::PlayerOption,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "qualifier", description = "Qualifier attempts against the scoring authority"),
        (name = "matches", description = "Live match management"),
        (name = "observers", description = "WebSocket and SSE observer streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/healthcheck",
            "/qualifier/attempts",
            "/qualifier/attempts/remaining",
            "/qualifier/attempts/submit",
            "/qualifier/subjects/{subject_id}/attempts",
            "/matches",
            "/matches/{id}",
            "/matches/{id}/play",
            "/sse/matches",
            "/ws",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn document_registers_error_and_play_schemas() {
        let doc = ApiDoc::openapi();
        let schemas = doc.components.expect("components").schemas;

        for expected in ["ErrorBody", "PlaySong", "MatchSnapshot"] {
            assert!(schemas.contains_key(expected), "missing schema {expected}");
        }
    }
}
