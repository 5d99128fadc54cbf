/// Sequencing of qualifier attempts against the scoring authority.
pub mod attempt_workflow;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Level key resolution with coalesced catalog refills.
pub mod level_cache;
/// Match lifecycle commands with write-through persistence.
pub mod match_service;
/// HTTP-facing qualifier commands with attempt recording.
pub mod qualifier_service;
/// Server-Sent Events match stream.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Per-subject credential cache.
pub mod token_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
