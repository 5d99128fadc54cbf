//! Library crate for qualifier-coord, exposing modules for binaries and integration tests.

/// Environment-driven application configuration.
pub mod config;
/// Persistence and scoring authority access.
pub mod dao;
/// Request, response and wire message shapes.
pub mod dto;
/// Error types shared by services and routes.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared application state and live match coordination.
pub mod state;
