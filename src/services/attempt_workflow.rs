//! Sequencing of qualifier attempts against the remote scoring authority.
//!
//! A subject moves `idle -> opening -> open -> submitting -> idle`. The slot
//! is claimed before the first remote call of a start and is only released
//! once the matching submit has finished, so a second start for the same
//! subject is rejected during the whole window.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    dao::scoring::{LevelKey, LevelRef, ScoreId, ScoringGateway, SubjectId},
    error::QualifierError,
    services::{level_cache::LevelKeyCache, token_service::SessionTokenManager},
};

/// An attempt whose score row exists upstream and awaits its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSession {
    /// Player the attempt belongs to.
    pub subject: SubjectId,
    /// Level being played.
    pub level: LevelRef,
    /// Remote key of `level`.
    pub level_key: LevelKey,
    /// Score row created upstream for this attempt.
    pub score_id: ScoreId,
    /// When the score row was created.
    pub opened_at: OffsetDateTime,
}

#[derive(Debug)]
enum AttemptSlot {
    Opening(LevelRef),
    Open(AttemptSession),
    Submitting(AttemptSession),
}

/// Releases a claimed slot when dropped, unless the slot was committed.
///
/// Dropping the future of a start or submit therefore never leaves a subject
/// stuck.
struct SlotGuard<'a> {
    sessions: &'a DashMap<SubjectId, AttemptSlot>,
    subject: &'a str,
    armed: bool,
}

impl<'a> SlotGuard<'a> {
    fn new(sessions: &'a DashMap<SubjectId, AttemptSlot>, subject: &'a str) -> Self {
        Self {
            sessions,
            subject,
            armed: true,
        }
    }

    fn commit(mut self, slot: AttemptSlot) {
        self.sessions.insert(self.subject.to_string(), slot);
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sessions.remove(self.subject);
            debug!(subject = self.subject, "attempt slot released");
        }
    }
}

/// Orchestrates remaining-attempt checks and the create/submit lifecycle.
pub struct QualifierWorkflow {
    tokens: SessionTokenManager,
    levels: LevelKeyCache,
    gateway: Arc<dyn ScoringGateway>,
    sessions: DashMap<SubjectId, AttemptSlot>,
}

impl QualifierWorkflow {
    /// Build a workflow, its token manager and level cache over one gateway.
    pub fn new(gateway: Arc<dyn ScoringGateway>) -> Self {
        Self {
            tokens: SessionTokenManager::new(gateway.clone()),
            levels: LevelKeyCache::new(gateway.clone()),
            gateway,
            sessions: DashMap::new(),
        }
    }

    /// Credential store used by the workflow.
    pub fn tokens(&self) -> &SessionTokenManager {
        &self.tokens
    }

    /// Level key cache used by the workflow.
    pub fn levels(&self) -> &LevelKeyCache {
        &self.levels
    }

    /// Report how many attempts `subject` has left on `level`.
    ///
    /// Never changes session state; rejecting a start on a non-positive count
    /// is up to the caller (or [`Self::start_checked_attempt`]).
    pub async fn check_remaining_attempts(
        &self,
        subject: &str,
        level: &LevelRef,
    ) -> Result<i64, QualifierError> {
        let credential = self.tokens.ensure_valid(subject).await?;
        let key = self.levels.resolve(&credential, level).await?;
        let remaining = self
            .gateway
            .query_remaining_attempts(credential, key)
            .await?;
        debug!(subject, %level, remaining, "remaining attempts queried");
        Ok(remaining)
    }

    /// Open an attempt for `subject` on `level` by creating its score row.
    pub async fn start_attempt(
        &self,
        subject: &str,
        level: LevelRef,
    ) -> Result<AttemptSession, QualifierError> {
        self.open(subject, level, false).await
    }

    /// Like [`Self::start_attempt`], but queries the remaining count while
    /// holding the subject's slot and refuses when it is not positive.
    pub async fn start_checked_attempt(
        &self,
        subject: &str,
        level: LevelRef,
    ) -> Result<AttemptSession, QualifierError> {
        self.open(subject, level, true).await
    }

    /// Submit the final score of the open attempt and release the slot.
    ///
    /// The slot is released whatever the outcome of the remote call.
    pub async fn submit_attempt(
        &self,
        subject: &str,
        score: i64,
    ) -> Result<AttemptSession, QualifierError> {
        let session = {
            let Some(mut slot) = self.sessions.get_mut(subject) else {
                return Err(QualifierError::NoOpenAttempt(subject.to_string()));
            };
            let AttemptSlot::Open(session) = &*slot else {
                return Err(QualifierError::NoOpenAttempt(subject.to_string()));
            };
            let session = session.clone();
            *slot = AttemptSlot::Submitting(session.clone());
            session
        };
        let _release = SlotGuard::new(&self.sessions, subject);

        let credential = self.tokens.ensure_valid(subject).await?;
        if let Err(err) = self
            .gateway
            .submit_score(credential, session.score_id, score)
            .await
        {
            warn!(subject, score_id = %session.score_id, error = %err, "score submission failed");
            return Err(err.into());
        }

        info!(subject, level = %session.level, score_id = %session.score_id, score, "attempt submitted");
        Ok(session)
    }

    /// Open attempt currently held for `subject`, if any.
    pub fn open_session(&self, subject: &str) -> Option<AttemptSession> {
        self.sessions
            .get(subject)
            .and_then(|slot| match slot.value() {
                AttemptSlot::Open(session) => Some(session.clone()),
                AttemptSlot::Opening(_) | AttemptSlot::Submitting(_) => None,
            })
    }

    /// Whether `subject` currently occupies its slot in any phase.
    pub fn is_busy(&self, subject: &str) -> bool {
        self.sessions.contains_key(subject)
    }

    async fn open(
        &self,
        subject: &str,
        level: LevelRef,
        checked: bool,
    ) -> Result<AttemptSession, QualifierError> {
        let guard = self.claim(subject, &level)?;

        let credential = self.tokens.ensure_valid(subject).await?;
        let level_key = self.levels.resolve(&credential, &level).await?;

        if checked {
            let remaining = self
                .gateway
                .query_remaining_attempts(credential.clone(), level_key)
                .await?;
            if remaining <= 0 {
                info!(subject, %level, remaining, "start refused; no attempts left");
                return Err(QualifierError::NoAttemptsRemaining {
                    subject: subject.to_string(),
                    level,
                });
            }
        }

        let score_id = self.gateway.create_score(credential, level_key).await?;
        let session = AttemptSession {
            subject: subject.to_string(),
            level,
            level_key,
            score_id,
            opened_at: OffsetDateTime::now_utc(),
        };
        guard.commit(AttemptSlot::Open(session.clone()));

        info!(subject, level = %session.level, %score_id, "attempt opened");
        Ok(session)
    }

    fn claim<'a>(&'a self, subject: &'a str, level: &LevelRef) -> Result<SlotGuard<'a>, QualifierError> {
        match self.sessions.entry(subject.to_string()) {
            Entry::Occupied(existing) => {
                let phase = match existing.get() {
                    AttemptSlot::Opening(_) => "opening",
                    AttemptSlot::Open(_) => "open",
                    AttemptSlot::Submitting(_) => "submitting",
                };
                warn!(subject, %level, phase, "attempt already in progress");
                Err(QualifierError::AttemptAlreadyOpen(subject.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(AttemptSlot::Opening(level.clone()));
                Ok(SlotGuard::new(&self.sessions, subject))
            }
        }
    }
}
