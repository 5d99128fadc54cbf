use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dao::scoring::{ScoringError, ScoringOperation};

/// Exchange a subject id for a bearer credential.
pub const LOGIN_MUTATION: &str = r#"
mutation Login($userId: String!) {
  authenticatePlayer(input: {userId: $userId}) {
    jwtToken
  }
}"#;

/// Full level catalog.
pub const LEVELS_QUERY: &str = r#"
query GetLevels {
  levels {
    nodes {
      id
      songHash
      difficulty
    }
  }
}"#;

/// Remaining attempts of the caller on one level.
pub const ATTEMPTS_QUERY: &str = r#"
query AttemptsRemaining($levelId: Int!) {
  level(id: $levelId) {
    remainingAttempts
  }
}"#;

/// Open a score record, consuming an attempt.
pub const CREATE_SCORE_MUTATION: &str = r#"
mutation CreateScore($levelId: Int!) {
  createQualifierScore(input: { qualifierScore: { levelId: $levelId } }) {
    qualifierScore {
      id
    }
  }
}"#;

/// Fill in the value of an open score record.
pub const SUBMIT_SCORE_MUTATION: &str = r#"
mutation SubmitScore($scoreId: Int!, $score: Int!) {
  updateQualifierScore(input: { id: $scoreId, patch: { score: $score } }) {
    qualifierScore {
      id
      score
      timeSet
    }
  }
}"#;

/// Body of a GraphQL POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest<'a, V> {
    pub query: &'static str,
    pub operation_name: &'a str,
    pub variables: V,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// One entry of the `errors` member.
#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

/// Why a GraphQL exchange produced no usable data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// No readable answer: transport error, timeout, unexpected status or
    /// malformed body.
    Transport(String),
    /// The authority answered and refused the request.
    Rejected(String),
}

impl CallFailure {
    /// Report the failure as a remote error of `operation`.
    pub fn into_remote(self, operation: ScoringOperation) -> ScoringError {
        match self {
            CallFailure::Transport(message) | CallFailure::Rejected(message) => {
                ScoringError::remote(operation, message)
            }
        }
    }
}

impl<T> GraphQlResponse<T> {
    /// Unwrap the `data` member. GraphQL errors count as a refusal.
    pub fn into_data(self) -> Result<T, CallFailure> {
        if !self.errors.is_empty() {
            let messages = self
                .errors
                .into_iter()
                .map(|err| err.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CallFailure::Rejected(messages));
        }

        self.data
            .ok_or_else(|| CallFailure::Transport("response carried no data".into()))
    }
}

/// Variables of argument-less operations.
#[derive(Debug, Serialize)]
pub struct NoVariables {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVariables<'a> {
    pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelVariables {
    pub level_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVariables {
    pub score_id: i64,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub authenticate_player: Option<AuthenticatePlayerPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePlayerPayload {
    pub jwt_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LevelsData {
    pub levels: LevelConnection,
}

#[derive(Debug, Deserialize)]
pub struct LevelConnection {
    pub nodes: Vec<LevelNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelNode {
    pub id: i64,
    pub song_hash: String,
    pub difficulty: String,
}

#[derive(Debug, Deserialize)]
pub struct AttemptsData {
    pub level: Option<LevelAttempts>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAttempts {
    pub remaining_attempts: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScoreData {
    pub create_qualifier_score: Option<QualifierScorePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreData {
    pub update_qualifier_score: Option<QualifierScorePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifierScorePayload {
    pub qualifier_score: Option<QualifierScoreNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifierScoreNode {
    pub id: i64,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub time_set: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Read the `exp` claim of a JWT without verifying its signature.
pub fn token_expiry(token: &str) -> Option<OffsetDateTime> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    OffsetDateTime::from_unix_timestamp(claims.exp).ok()
}
