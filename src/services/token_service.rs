//! Per-subject bearer credentials, refreshed lazily when they expire.

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dao::scoring::{Credential, ScoringGateway, SubjectId},
    error::QualifierError,
};

type CredentialSlot = Arc<Mutex<Option<Credential>>>;

/// Holds exactly one live credential per subject.
///
/// Each subject owns its own async lock, so a slow authentication for one
/// player never delays another player's calls.
pub struct SessionTokenManager {
    gateway: Arc<dyn ScoringGateway>,
    credentials: DashMap<SubjectId, CredentialSlot>,
}

impl SessionTokenManager {
    /// Create an empty manager issuing credentials through `gateway`.
    pub fn new(gateway: Arc<dyn ScoringGateway>) -> Self {
        Self {
            gateway,
            credentials: DashMap::new(),
        }
    }

    /// Return a credential for `subject` that is valid right now.
    pub async fn ensure_valid(&self, subject: &str) -> Result<Credential, QualifierError> {
        self.ensure_valid_at(subject, OffsetDateTime::now_utc()).await
    }

    /// Return a credential for `subject` that is valid at `now`, authenticating
    /// when none is held or the held one expires at or before `now`.
    pub async fn ensure_valid_at(
        &self,
        subject: &str,
        now: OffsetDateTime,
    ) -> Result<Credential, QualifierError> {
        let slot = self.slot(subject);
        let mut held = slot.lock().await;

        match held.as_ref() {
            Some(credential) if credential.is_valid_at(now) => {
                debug!(subject, "reusing held credential");
                return Ok(credential.clone());
            }
            Some(credential) => {
                info!(subject, expired_at = %credential.expires_at, "credential expired; refreshing")
            }
            None => info!(subject, "no credential held yet; authenticating"),
        }

        let credential = self.gateway.authenticate(subject.to_string()).await?;
        if !credential.is_valid_at(now) {
            warn!(subject, expires_at = %credential.expires_at, "authority issued an already expired credential");
            return Err(QualifierError::AuthenticationFailed {
                subject: subject.to_string(),
                reason: "issued credential is already expired".into(),
            });
        }

        *held = Some(credential.clone());
        Ok(credential)
    }

    /// Credential currently held for `subject`, valid or not.
    pub async fn held(&self, subject: &str) -> Option<Credential> {
        let slot = self.credentials.get(subject).map(|entry| entry.value().clone())?;
        let held = slot.lock().await;
        held.clone()
    }

    fn slot(&self, subject: &str) -> CredentialSlot {
        self.credentials
            .entry(subject.to_string())
            .or_default()
            .value()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::scoring::fake::FakeGateway;

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    fn manager(fake: &FakeGateway) -> SessionTokenManager {
        SessionTokenManager::new(Arc::new(fake.clone()))
    }

    #[tokio::test]
    async fn first_use_authenticates_once_then_reuses() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(2_000));
        let tokens = manager(&fake);

        let first = tokens.ensure_valid_at("p1", at(1_000)).await.unwrap();
        let second = tokens.ensure_valid_at("p1", at(1_500)).await.unwrap();

        assert_eq!(fake.auth_calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.subject, "p1");
    }

    #[tokio::test]
    async fn expired_credential_triggers_exactly_one_refresh() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(2_000));
        let tokens = manager(&fake);
        tokens.ensure_valid_at("p1", at(1_000)).await.unwrap();

        fake.issue_expiring_at(at(5_000));
        let refreshed = tokens.ensure_valid_at("p1", at(2_001)).await.unwrap();
        assert_eq!(fake.auth_calls(), 2);
        assert_eq!(refreshed.expires_at, at(5_000));

        tokens.ensure_valid_at("p1", at(2_002)).await.unwrap();
        assert_eq!(fake.auth_calls(), 2);
    }

    #[tokio::test]
    async fn credential_expiring_now_is_refreshed() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(2_000));
        let tokens = manager(&fake);
        tokens.ensure_valid_at("p1", at(1_000)).await.unwrap();

        fake.issue_expiring_at(at(3_000));
        let credential = tokens.ensure_valid_at("p1", at(2_000)).await.unwrap();
        assert!(credential.is_valid_at(at(2_000)));
        assert_eq!(fake.auth_calls(), 2);
    }

    #[tokio::test]
    async fn authentication_failure_propagates_without_state_change() {
        let fake = FakeGateway::new();
        fake.reject_auth(true);
        let tokens = manager(&fake);

        let err = tokens.ensure_valid_at("p1", at(1_000)).await.unwrap_err();
        assert!(matches!(err, QualifierError::AuthenticationFailed { .. }));
        assert!(tokens.held("p1").await.is_none());
        assert_eq!(fake.auth_calls(), 1);
    }

    #[tokio::test]
    async fn already_expired_issue_is_rejected() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(500));
        let tokens = manager(&fake);

        let err = tokens.ensure_valid_at("p1", at(1_000)).await.unwrap_err();
        assert!(matches!(err, QualifierError::AuthenticationFailed { .. }));
        assert!(tokens.held("p1").await.is_none());
    }

    #[tokio::test]
    async fn subjects_hold_independent_credentials() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(2_000));
        let tokens = manager(&fake);

        let p1 = tokens.ensure_valid_at("p1", at(1_000)).await.unwrap();
        let p2 = tokens.ensure_valid_at("p2", at(1_000)).await.unwrap();

        assert_eq!(fake.auth_calls(), 2);
        assert_ne!(p1.token, p2.token);
        assert_eq!(p2.subject, "p2");
    }

    #[tokio::test]
    async fn concurrent_callers_for_one_subject_share_a_refresh() {
        let fake = FakeGateway::new();
        fake.issue_expiring_at(at(2_000));
        let tokens = Arc::new(manager(&fake));

        let calls = (0..8).map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.ensure_valid_at("p1", at(1_000)).await })
        });
        for result in futures::future::join_all(calls).await {
            result.unwrap().unwrap();
        }

        assert_eq!(fake.auth_calls(), 1);
    }
}
