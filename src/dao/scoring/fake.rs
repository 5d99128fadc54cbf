//! In-process [`ScoringGateway`] used by unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use time::OffsetDateTime;

use super::{
    CatalogEntry, Credential, Difficulty, LevelKey, LevelRef, ScoreId, ScoringError,
    ScoringGateway, ScoringOperation, ScoringResult, SubjectId,
};

#[derive(Default)]
struct Inner {
    catalog: Mutex<Vec<CatalogEntry>>,
    expires_at: Mutex<Option<OffsetDateTime>>,
    remaining: AtomicI64,
    next_score_id: AtomicI64,
    catalog_delay: Mutex<Duration>,
    reject_auth: AtomicBool,
    fail_submit: AtomicBool,
    auth_calls: AtomicUsize,
    catalog_calls: AtomicUsize,
    create_calls: AtomicUsize,
    submitted: Mutex<Vec<(ScoreId, i64)>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeGateway {
    inner: Arc<Inner>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        let fake = Self::default();
        fake.inner.next_score_id.store(100, Ordering::SeqCst);
        fake.inner.remaining.store(3, Ordering::SeqCst);
        fake
    }

    pub(crate) fn with_level(self, song_hash: &str, difficulty: Difficulty, key: i64) -> Self {
        self.inner.catalog.lock().unwrap().push(CatalogEntry {
            level: LevelRef::new(song_hash, difficulty),
            key: LevelKey(key),
        });
        self
    }

    pub(crate) fn set_level_key(&self, song_hash: &str, difficulty: Difficulty, key: i64) {
        let mut catalog = self.inner.catalog.lock().unwrap();
        catalog.retain(|entry| entry.level != LevelRef::new(song_hash, difficulty));
        catalog.push(CatalogEntry {
            level: LevelRef::new(song_hash, difficulty),
            key: LevelKey(key),
        });
    }

    pub(crate) fn issue_expiring_at(&self, expires_at: OffsetDateTime) {
        *self.inner.expires_at.lock().unwrap() = Some(expires_at);
    }

    pub(crate) fn set_catalog_delay(&self, delay: Duration) {
        *self.inner.catalog_delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_remaining(&self, remaining: i64) {
        self.inner.remaining.store(remaining, Ordering::SeqCst);
    }

    pub(crate) fn reject_auth(&self, reject: bool) {
        self.inner.reject_auth.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn fail_submit(&self, fail: bool) {
        self.inner.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn auth_calls(&self) -> usize {
        self.inner.auth_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn catalog_calls(&self) -> usize {
        self.inner.catalog_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<(ScoreId, i64)> {
        self.inner.submitted.lock().unwrap().clone()
    }
}

impl ScoringGateway for FakeGateway {
    fn authenticate(&self, subject: SubjectId) -> BoxFuture<'static, ScoringResult<Credential>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let call = inner.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::task::yield_now().await;
            if inner.reject_auth.load(Ordering::SeqCst) {
                return Err(ScoringError::AuthenticationFailed {
                    subject,
                    reason: "unknown user".into(),
                });
            }
            let expires_at = inner
                .expires_at
                .lock()
                .unwrap()
                .unwrap_or_else(|| OffsetDateTime::now_utc() + time::Duration::hours(1));
            Ok(Credential {
                token: format!("token-{subject}-{call}"),
                subject,
                expires_at,
            })
        })
    }

    fn fetch_catalog(
        &self,
        _credential: Credential,
    ) -> BoxFuture<'static, ScoringResult<Vec<CatalogEntry>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.catalog_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *inner.catalog_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            Ok(inner.catalog.lock().unwrap().clone())
        })
    }

    fn query_remaining_attempts(
        &self,
        _credential: Credential,
        _key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<i64>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.remaining.load(Ordering::SeqCst)) })
    }

    fn create_score(
        &self,
        _credential: Credential,
        _key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<ScoreId>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.create_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(ScoreId(inner.next_score_id.fetch_add(1, Ordering::SeqCst)))
        })
    }

    fn submit_score(
        &self,
        _credential: Credential,
        score_id: ScoreId,
        score: i64,
    ) -> BoxFuture<'static, ScoringResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.submitted.lock().unwrap().push((score_id, score));
            if inner.fail_submit.load(Ordering::SeqCst) {
                return Err(ScoringError::remote(
                    ScoringOperation::SubmitScore,
                    "connection reset",
                ));
            }
            Ok(())
        })
    }
}
