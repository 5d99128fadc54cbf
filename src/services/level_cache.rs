//! Lazily populated map from (song, difficulty) to the authority's level key.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dao::scoring::{Credential, LevelKey, LevelRef, ScoringGateway},
    error::QualifierError,
};

/// Cache of remote level keys filled by whole-catalog downloads.
///
/// Misses that happen while a download is running wait for it and re-check
/// instead of starting their own. Refills only ever add entries.
pub struct LevelKeyCache {
    gateway: Arc<dyn ScoringGateway>,
    entries: DashMap<LevelRef, LevelKey>,
    /// Number of completed refills; bumped only after entries are inserted.
    generation: AtomicU64,
    refill_gate: Mutex<()>,
}

impl LevelKeyCache {
    /// Create an empty cache backed by `gateway`.
    pub fn new(gateway: Arc<dyn ScoringGateway>) -> Self {
        Self {
            gateway,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            refill_gate: Mutex::new(()),
        }
    }

    /// Resolve `level` to its remote key, downloading the catalog on a miss.
    pub async fn resolve(
        &self,
        credential: &Credential,
        level: &LevelRef,
    ) -> Result<LevelKey, QualifierError> {
        let seen = self.generation.load(Ordering::Acquire);
        if let Some(key) = self.lookup(level) {
            debug!(%level, %key, "level key cache hit");
            return Ok(key);
        }

        {
            let _gate = self.refill_gate.lock().await;
            if self.generation.load(Ordering::Acquire) == seen {
                self.refill(credential).await?;
            } else {
                debug!(%level, "catalog refilled while waiting; re-checking");
            }
        }

        self.lookup(level).ok_or_else(|| {
            warn!(%level, "level missing from refreshed catalog");
            QualifierError::LevelNotFound(level.clone())
        })
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of catalog downloads that completed.
    pub fn refills(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn lookup(&self, level: &LevelRef) -> Option<LevelKey> {
        self.entries.get(level).map(|entry| *entry.value())
    }

    async fn refill(&self, credential: &Credential) -> Result<(), QualifierError> {
        info!("fetching level catalog");
        let catalog = self.gateway.fetch_catalog(credential.clone()).await?;

        let mut added = 0usize;
        for entry in catalog {
            match self.entries.entry(entry.level) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.key);
                    added += 1;
                }
                Entry::Occupied(existing) if *existing.get() != entry.key => {
                    warn!(
                        level = %existing.key(),
                        cached = %existing.get(),
                        upstream = %entry.key,
                        "catalog reports a different key; keeping the cached one"
                    );
                }
                Entry::Occupied(_) => {}
            }
        }

        self.generation.fetch_add(1, Ordering::Release);
        info!(added, total = self.entries.len(), "level catalog indexed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use super::*;
    use crate::dao::scoring::{Difficulty, fake::FakeGateway};

    fn credential() -> Credential {
        Credential {
            subject: "p1".into(),
            token: "token".into(),
            expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn empty_cache_resolves_through_one_catalog_fetch() {
        let fake = FakeGateway::new()
            .with_level("ab12cd34", Difficulty::Expert, 42)
            .with_level("ab12cd34", Difficulty::Hard, 41);
        let cache = LevelKeyCache::new(Arc::new(fake.clone()));
        let level = LevelRef::new("ab12cd34", Difficulty::Expert);

        assert_eq!(cache.resolve(&credential(), &level).await.unwrap(), LevelKey(42));
        assert_eq!(fake.catalog_calls(), 1);
        assert_eq!(cache.len(), 2);

        let hard = LevelRef::new("custom_level_ab12cd34", Difficulty::Hard);
        assert_eq!(cache.resolve(&credential(), &hard).await.unwrap(), LevelKey(41));
        assert_eq!(fake.catalog_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_level_fails_after_single_refill() {
        let fake = FakeGateway::new().with_level("ab12cd34", Difficulty::Expert, 42);
        let cache = LevelKeyCache::new(Arc::new(fake.clone()));
        let level = LevelRef::new("ffffffff", Difficulty::Easy);

        let err = cache.resolve(&credential(), &level).await.unwrap_err();
        assert!(matches!(err, QualifierError::LevelNotFound(missing) if missing == level));
        assert_eq!(fake.catalog_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_refill() {
        let hashes = ["aa01", "aa02", "aa03", "aa04", "aa05", "aa06"];
        let mut fake = FakeGateway::new();
        for (index, hash) in hashes.iter().enumerate() {
            fake = fake.with_level(hash, Difficulty::Normal, index as i64);
        }
        fake.set_catalog_delay(Duration::from_millis(50));
        let cache = Arc::new(LevelKeyCache::new(Arc::new(fake.clone())));

        let lookups = hashes.iter().map(|hash| {
            let cache = cache.clone();
            let level = LevelRef::new(hash, Difficulty::Normal);
            tokio::spawn(async move { cache.resolve(&credential(), &level).await })
        });
        let keys = futures::future::join_all(lookups).await;

        for (index, key) in keys.into_iter().enumerate() {
            assert_eq!(key.unwrap().unwrap(), LevelKey(index as i64));
        }
        assert_eq!(fake.catalog_calls(), 1);
        assert_eq!(cache.refills(), 1);
    }

    #[tokio::test]
    async fn later_refill_adds_without_overwriting() {
        let fake = FakeGateway::new().with_level("ab12cd34", Difficulty::Expert, 42);
        let cache = LevelKeyCache::new(Arc::new(fake.clone()));
        let known = LevelRef::new("ab12cd34", Difficulty::Expert);
        cache.resolve(&credential(), &known).await.unwrap();

        fake.set_level_key("ab12cd34", Difficulty::Expert, 99);
        fake.set_level_key("cd56ef78", Difficulty::Easy, 7);
        let fresh = LevelRef::new("cd56ef78", Difficulty::Easy);

        assert_eq!(cache.resolve(&credential(), &fresh).await.unwrap(), LevelKey(7));
        assert_eq!(cache.resolve(&credential(), &known).await.unwrap(), LevelKey(42));
        assert_eq!(fake.catalog_calls(), 2);
        assert_eq!(cache.len(), 2);
    }
}
