use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::{
        scoring::{LevelRef, ScoringError, ScoringOperation, SubjectId},
        storage::StorageError,
    },
    state::MatchError,
};

/// Failures of the qualifier attempt workflow and its collaborators.
#[derive(Debug, Error)]
pub enum QualifierError {
    /// The scoring authority refused to issue a credential.
    #[error("authentication failed for `{subject}`: {reason}")]
    AuthenticationFailed {
        /// Subject the credential was requested for.
        subject: SubjectId,
        /// Refusal reason reported by the authority.
        reason: String,
    },
    /// The level has no remote key even after a full catalog refill.
    #[error("level `{0}` is unknown to the scoring authority")]
    LevelNotFound(LevelRef),
    /// The subject already has an attempt being opened or open.
    #[error("an attempt is already open for `{0}`")]
    AttemptAlreadyOpen(SubjectId),
    /// Submit called without an open attempt.
    #[error("no open attempt for `{0}`")]
    NoOpenAttempt(SubjectId),
    /// Checked start refused because the remote count is exhausted.
    #[error("no attempts left for `{subject}` on `{level}`")]
    NoAttemptsRemaining {
        /// Subject that tried to start.
        subject: SubjectId,
        /// Level whose attempts are used up.
        level: LevelRef,
    },
    /// Any other failure reported by the scoring authority.
    #[error("remote service failure during `{operation}`: {message}")]
    RemoteService {
        /// Remote operation that failed.
        operation: ScoringOperation,
        /// Failure description from the remote side.
        message: String,
    },
}

impl From<ScoringError> for QualifierError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::AuthenticationFailed { subject, reason } => {
                QualifierError::AuthenticationFailed { subject, reason }
            }
            ScoringError::Remote { operation, message } => {
                QualifierError::RemoteService { operation, message }
            }
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The remote scoring authority failed.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<QualifierError> for ServiceError {
    fn from(err: QualifierError) -> Self {
        let message = err.to_string();
        match err {
            QualifierError::AuthenticationFailed { .. } => ServiceError::Unauthorized(message),
            QualifierError::LevelNotFound(_) => ServiceError::NotFound(message),
            QualifierError::AttemptAlreadyOpen(_)
            | QualifierError::NoOpenAttempt(_)
            | QualifierError::NoAttemptsRemaining { .. } => ServiceError::InvalidState(message),
            QualifierError::RemoteService { .. } => ServiceError::Upstream(message),
        }
    }
}

impl From<MatchError> for ServiceError {
    fn from(err: MatchError) -> Self {
        let message = err.to_string();
        match err {
            MatchError::NotFound(_) => ServiceError::NotFound(message),
            MatchError::PlayerNotInMatch { .. } => ServiceError::InvalidInput(message),
            MatchError::UnknownCharacteristic(_)
            | MatchError::DifficultyNotAvailable { .. }
            | MatchError::NoSongSelected
            | MatchError::NoCharacteristicSelected
            | MatchError::NoDifficultySelected => ServiceError::InvalidState(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The scoring authority failed to answer properly.
    #[error("bad gateway: {0}")]
    BadGateway(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Upstream(message) => AppError::BadGateway(message),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::scoring::Difficulty;

    fn status_of(err: impl Into<ServiceError>) -> StatusCode {
        AppError::from(err.into()).into_response().status()
    }

    #[test]
    fn qualifier_errors_map_to_http_statuses() {
        let level = LevelRef::new("ab12cd34", Difficulty::Expert);
        assert_eq!(
            status_of(QualifierError::AuthenticationFailed {
                subject: "p1".into(),
                reason: "nope".into(),
            }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(QualifierError::LevelNotFound(level.clone())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(QualifierError::AttemptAlreadyOpen("p1".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(QualifierError::NoAttemptsRemaining {
                subject: "p1".into(),
                level,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(QualifierError::RemoteService {
                operation: ScoringOperation::SubmitScore,
                message: "timeout".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn remote_failure_keeps_operation_name() {
        let err: QualifierError =
            ScoringError::remote(ScoringOperation::CreateScore, "connection reset").into();
        assert!(err.to_string().contains("create_score"));
        assert!(matches!(
            err,
            QualifierError::RemoteService {
                operation: ScoringOperation::CreateScore,
                ..
            }
        ));
    }

    #[test]
    fn match_errors_map_to_http_statuses() {
        assert_eq!(status_of(MatchError::NotFound(uuid::Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(MatchError::NoSongSelected), StatusCode::CONFLICT);
    }
}
