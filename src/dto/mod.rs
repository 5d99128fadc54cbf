use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Match snapshots and update requests.
pub mod matches;
/// Qualifier command requests and responses.
pub mod qualifier;
/// Input validation helpers.
pub mod validation;
/// Observer channel messages.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    format_timestamp(OffsetDateTime::from(time))
}

fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
