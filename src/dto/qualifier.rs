use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::{
        models::{AttemptEntity, AttemptStatus},
        scoring::{Difficulty, LevelRef},
    },
    dto::{format_system_time, format_timestamp, validation::validate_level_id},
    error::ServiceError,
    services::attempt_workflow::AttemptSession,
};

/// Level addressed by a game client: song identifier plus numeric difficulty.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LevelInput {
    /// Song identifier, with or without the `custom_level_` prefix.
    #[validate(custom(function = "validate_level_id"))]
    pub level_id: String,
    /// Numeric difficulty, 0 (easy) to 4 (expert+).
    #[validate(range(max = 4))]
    pub difficulty: u8,
}

impl LevelInput {
    /// Normalised level reference.
    pub fn level_ref(&self) -> Result<LevelRef, ServiceError> {
        let difficulty = Difficulty::from_index(self.difficulty).ok_or_else(|| {
            ServiceError::InvalidInput(format!("unknown difficulty {}", self.difficulty))
        })?;
        Ok(LevelRef::new(&self.level_id, difficulty))
    }
}

/// Ask how many attempts a player has left on a level.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RemainingAttemptsRequest {
    /// Player asking.
    #[validate(length(min = 1, max = 128))]
    pub subject_id: String,
    /// Level the attempts are counted on.
    #[serde(flatten)]
    #[validate(nested)]
    pub level: LevelInput,
}

/// Open a qualifier attempt.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartAttemptRequest {
    /// Player opening the attempt.
    #[validate(length(min = 1, max = 128))]
    pub subject_id: String,
    /// Level to play.
    #[serde(flatten)]
    #[validate(nested)]
    pub level: LevelInput,
    /// Refuse to open the attempt when no attempts are left.
    #[serde(default)]
    pub checked: bool,
}

/// Submit the final score of the open attempt.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAttemptRequest {
    /// Player holding the open attempt.
    #[validate(length(min = 1, max = 128))]
    pub subject_id: String,
    /// Final score value.
    #[validate(range(min = 0))]
    pub score: i64,
}

/// Level as echoed back to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct LevelSummary {
    /// Bare song hash, without the `custom_level_` prefix.
    pub song_hash: String,
    /// Difficulty label.
    pub difficulty: Difficulty,
}

impl From<&LevelRef> for LevelSummary {
    fn from(level: &LevelRef) -> Self {
        Self {
            song_hash: level.song_hash().to_string(),
            difficulty: level.difficulty(),
        }
    }
}

/// Remaining attempts of a player on a level.
#[derive(Debug, Serialize, ToSchema)]
pub struct RemainingAttemptsResponse {
    /// Player the count belongs to.
    pub subject_id: String,
    /// Level the count applies to.
    pub level: LevelSummary,
    /// Attempts left; zero or less means the player may not start another.
    pub remaining: i64,
}

/// Attempt opened or closed by the workflow.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttemptResponse {
    /// Player owning the attempt.
    pub subject_id: String,
    /// Level being played.
    pub level: LevelSummary,
    /// Key the scoring authority uses for the level.
    pub level_key: i64,
    /// Score row created for the attempt.
    pub score_id: i64,
    /// RFC 3339 timestamp of the score row creation.
    pub opened_at: String,
    /// Submitted score, once the attempt is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl AttemptResponse {
    /// Response for a freshly opened attempt.
    pub fn opened(session: &AttemptSession) -> Self {
        Self {
            subject_id: session.subject.clone(),
            level: LevelSummary::from(&session.level),
            level_key: session.level_key.0,
            score_id: session.score_id.0,
            opened_at: format_timestamp(session.opened_at),
            score: None,
        }
    }

    /// Response for an attempt closed with `score`.
    pub fn submitted(session: &AttemptSession, score: i64) -> Self {
        Self {
            score: Some(score),
            ..Self::opened(session)
        }
    }
}

/// Stored audit record of an attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttemptRecord {
    /// Bare song hash.
    pub song_hash: String,
    /// Difficulty played.
    pub difficulty: Difficulty,
    /// Score row upstream.
    pub score_id: i64,
    /// Score sent with the submission, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// `open`, `submitted` or `submit_failed`.
    #[schema(value_type = String, example = "submitted")]
    pub status: AttemptStatus,
    /// RFC 3339 timestamp.
    pub opened_at: String,
    /// RFC 3339 timestamp, absent while the attempt is open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
}

impl From<AttemptEntity> for AttemptRecord {
    fn from(entity: AttemptEntity) -> Self {
        Self {
            song_hash: entity.song_hash,
            difficulty: entity.difficulty,
            score_id: entity.score_id,
            score: entity.score,
            status: entity.status,
            opened_at: format_system_time(entity.opened_at),
            closed_at: entity.closed_at.map(format_system_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[test]
    fn start_request_reads_flattened_level() {
        let request: StartAttemptRequest = serde_json::from_str(
            r#"{"subject_id":"76561198000000000","level_id":"custom_level_AB12","difficulty":3}"#,
        )
        .unwrap();

        assert!(request.validate().is_ok());
        assert!(!request.checked);
        let level = request.level.level_ref().unwrap();
        assert_eq!(level.song_hash(), "AB12");
        assert_eq!(level.difficulty(), Difficulty::Expert);
    }

    #[test]
    fn out_of_range_difficulty_is_rejected() {
        let request: RemainingAttemptsRequest = serde_json::from_str(
            r#"{"subject_id":"p1","level_id":"ab12","difficulty":7}"#,
        )
        .unwrap();

        assert!(request.validate().is_err());
        assert!(matches!(
            request.level.level_ref(),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn builtin_level_name_passes_validation() {
        let request: StartAttemptRequest = serde_json::from_str(
            r#"{"subject_id":"p1","level_id":"100Bills","difficulty":2}"#,
        )
        .unwrap();

        assert!(request.validate().is_ok());
        assert_eq!(request.level.level_ref().unwrap().song_hash(), "100Bills");
    }

    #[test]
    fn negative_score_is_rejected() {
        let request = SubmitAttemptRequest {
            subject_id: "p1".into(),
            score: -1,
        };
        assert!(request.validate().is_err());
    }
}
