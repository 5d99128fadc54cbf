//! Error types shared by scoring gateway implementations.

use thiserror::Error;

use super::models::{ScoringOperation, SubjectId};

/// Convenient result alias returning [`ScoringError`] failures.
pub type ScoringResult<T> = Result<T, ScoringError>;

/// Failures surfaced by the remote scoring authority.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// The authority refused to issue a credential.
    #[error("authentication rejected for subject `{subject}`: {reason}")]
    AuthenticationFailed {
        /// Subject the credential was requested for.
        subject: SubjectId,
        /// Refusal reason reported by the authority.
        reason: String,
    },
    /// Transport failure, malformed payload or remote-side rejection.
    #[error("remote scoring call `{operation}` failed: {message}")]
    Remote {
        /// Remote operation that failed.
        operation: ScoringOperation,
        /// Failure description from the remote side.
        message: String,
    },
}

impl ScoringError {
    /// Build a remote failure for the given operation.
    pub fn remote(operation: ScoringOperation, message: impl Into<String>) -> Self {
        ScoringError::Remote {
            operation,
            message: message.into(),
        }
    }
}
