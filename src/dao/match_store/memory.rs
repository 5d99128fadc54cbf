//! Process-local [`MatchStore`] used when no database is configured.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{AttemptEntity, MatchEntity},
    storage::StorageResult,
};

/// Keeps everything in memory; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    matches: Arc<DashMap<Uuid, MatchEntity>>,
    attempts: Arc<DashMap<i64, AttemptEntity>>,
}

impl MemoryMatchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn delete_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            matches.remove(&id);
            Ok(())
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let matches = self.matches.clone();
        Box::pin(async move {
            Ok(matches
                .iter()
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn save_attempt(&self, attempt: AttemptEntity) -> BoxFuture<'static, StorageResult<()>> {
        let attempts = self.attempts.clone();
        Box::pin(async move {
            attempts.insert(attempt.score_id, attempt);
            Ok(())
        })
    }

    fn list_attempts(
        &self,
        subject: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AttemptEntity>>> {
        let attempts = self.attempts.clone();
        Box::pin(async move {
            let mut found: Vec<AttemptEntity> = attempts
                .iter()
                .filter(|entry| entry.subject == subject)
                .map(|entry| entry.value().clone())
                .collect();
            found.sort_by_key(|attempt| attempt.opened_at);
            Ok(found)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::{models::AttemptStatus, scoring::Difficulty};

    fn attempt(subject: &str, score_id: i64, offset: u64) -> AttemptEntity {
        AttemptEntity {
            subject: subject.into(),
            song_hash: "ab12cd34".into(),
            difficulty: Difficulty::Expert,
            level_key: 42,
            score_id,
            score: None,
            status: AttemptStatus::Open,
            opened_at: SystemTime::UNIX_EPOCH + Duration::from_secs(offset),
            closed_at: None,
        }
    }

    #[tokio::test]
    async fn attempts_are_keyed_by_score_row_and_listed_per_subject() {
        let store = MemoryMatchStore::new();
        store.save_attempt(attempt("p1", 101, 20)).await.unwrap();
        store.save_attempt(attempt("p1", 100, 10)).await.unwrap();
        store.save_attempt(attempt("p2", 102, 30)).await.unwrap();

        let mut closed = attempt("p1", 100, 10);
        closed.status = AttemptStatus::Submitted;
        closed.score = Some(950_000);
        store.save_attempt(closed.clone()).await.unwrap();

        let p1 = store.list_attempts("p1".into()).await.unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0], closed);
        assert_eq!(p1[1].score_id, 101);
    }

    #[tokio::test]
    async fn deleted_match_is_no_longer_listed() {
        let store = MemoryMatchStore::new();
        let entity = MatchEntity {
            id: Uuid::new_v4(),
            players: vec![],
            selected_song: None,
            selected_characteristic: None,
            selected_difficulty: None,
            version: 0,
            updated_at: SystemTime::now(),
        };
        store.save_match(entity.clone()).await.unwrap();
        assert_eq!(store.list_matches().await.unwrap(), vec![entity.clone()]);

        store.delete_match(entity.id).await.unwrap();
        assert!(store.list_matches().await.unwrap().is_empty());
    }
}
