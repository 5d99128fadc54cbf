use std::time::Duration;

/// Default GraphQL endpoint of the scoring authority.
pub const DEFAULT_ENDPOINT: &str = "https://gql.beatsaberchampionship.eu/graphql";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration describing how to reach the scoring authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

impl ScoringConfig {
    /// Construct a configuration targeting `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}
