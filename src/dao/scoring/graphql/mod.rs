//! GraphQL-over-HTTP client for the championship scoring API.

mod config;
mod gateway;
mod models;

pub use config::ScoringConfig;
pub use gateway::GraphQlScoringGateway;
