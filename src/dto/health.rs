use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Matches currently held in memory.
    pub matches: usize,
    /// Connected observers.
    pub observers: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(matches: usize, observers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            matches,
            observers,
        }
    }

    /// Create a health response indicating the system runs without storage.
    pub fn degraded(matches: usize, observers: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            matches,
            observers,
        }
    }
}
