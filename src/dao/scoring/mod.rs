#[cfg(test)]
pub(crate) mod fake;
pub mod graphql;

mod error;
mod models;

use futures::future::BoxFuture;

pub use error::{ScoringError, ScoringResult};
pub use models::{
    CatalogEntry, Credential, Difficulty, LevelKey, LevelRef, ScoreId, ScoringOperation,
    SubjectId,
};

/// Abstraction over the remote leaderboard authority.
///
/// Every operation but [`ScoringGateway::authenticate`] must be called with a
/// credential that is still valid; callers obtain one from the session token
/// manager. Implementations never retry.
pub trait ScoringGateway: Send + Sync {
    /// Issue a fresh credential for `subject`.
    fn authenticate(&self, subject: SubjectId) -> BoxFuture<'static, ScoringResult<Credential>>;
    /// Download every (song, difficulty) pair known upstream with its key.
    fn fetch_catalog(
        &self,
        credential: Credential,
    ) -> BoxFuture<'static, ScoringResult<Vec<CatalogEntry>>>;
    /// Number of attempts the credential's subject has left on a level.
    fn query_remaining_attempts(
        &self,
        credential: Credential,
        key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<i64>>;
    /// Open a score row for an attempt on a level.
    fn create_score(
        &self,
        credential: Credential,
        key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<ScoreId>>;
    /// Record the final value of a previously created score row.
    fn submit_score(
        &self,
        credential: Credential,
        score_id: ScoreId,
        score: i64,
    ) -> BoxFuture<'static, ScoringResult<()>>;
}
