/// CouchDB-backed store.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process store.
pub mod memory;

use crate::dao::models::{AttemptEntity, MatchEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for matches and attempt records.
pub trait MatchStore: Send + Sync {
    /// Insert or replace a match.
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a match; unknown ids are not an error.
    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Return every stored match.
    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Insert or replace an attempt record.
    fn save_attempt(&self, attempt: AttemptEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Return the attempt records of `subject`.
    fn list_attempts(&self, subject: String)
    -> BoxFuture<'static, StorageResult<Vec<AttemptEntity>>>;
    /// Check that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
