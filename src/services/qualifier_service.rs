use std::time::SystemTime;

use tracing::{debug, warn};

use crate::{
    dao::models::{AttemptEntity, AttemptStatus},
    dto::qualifier::{
        AttemptRecord, AttemptResponse, LevelSummary, RemainingAttemptsRequest,
        RemainingAttemptsResponse, StartAttemptRequest, SubmitAttemptRequest,
    },
    error::ServiceError,
    services::attempt_workflow::AttemptSession,
    state::SharedState,
};

/// Report the remaining attempts of a player on a level.
pub async fn remaining_attempts(
    state: &SharedState,
    request: RemainingAttemptsRequest,
) -> Result<RemainingAttemptsResponse, ServiceError> {
    let level = request.level.level_ref()?;
    let remaining = state
        .qualifier()
        .check_remaining_attempts(&request.subject_id, &level)
        .await?;

    Ok(RemainingAttemptsResponse {
        subject_id: request.subject_id,
        level: LevelSummary::from(&level),
        remaining,
    })
}

/// Open an attempt and record it.
pub async fn start_attempt(
    state: &SharedState,
    request: StartAttemptRequest,
) -> Result<AttemptResponse, ServiceError> {
    let level = request.level.level_ref()?;
    let workflow = state.qualifier();
    let session = if request.checked {
        workflow
            .start_checked_attempt(&request.subject_id, level)
            .await?
    } else {
        workflow.start_attempt(&request.subject_id, level).await?
    };

    record_attempt(state, attempt_entity(&session, None, AttemptStatus::Open)).await;
    Ok(AttemptResponse::opened(&session))
}

/// Submit the score of the open attempt and record the outcome.
pub async fn submit_attempt(
    state: &SharedState,
    request: SubmitAttemptRequest,
) -> Result<AttemptResponse, ServiceError> {
    let workflow = state.qualifier();
    // Looked up beforehand so a failed submission can still be recorded.
    let pending = workflow.open_session(&request.subject_id);

    match workflow
        .submit_attempt(&request.subject_id, request.score)
        .await
    {
        Ok(session) => {
            record_attempt(
                state,
                attempt_entity(&session, Some(request.score), AttemptStatus::Submitted),
            )
            .await;
            Ok(AttemptResponse::submitted(&session, request.score))
        }
        Err(err) => {
            if let Some(session) = pending.filter(|_| !workflow.is_busy(&request.subject_id)) {
                record_attempt(
                    state,
                    attempt_entity(&session, Some(request.score), AttemptStatus::SubmitFailed),
                )
                .await;
            }
            Err(err.into())
        }
    }
}

/// Recorded attempts of a player, oldest first.
pub async fn attempt_history(
    state: &SharedState,
    subject_id: String,
) -> Result<Vec<AttemptRecord>, ServiceError> {
    let store = state.require_match_store().await?;
    let attempts = store.list_attempts(subject_id).await?;
    Ok(attempts.into_iter().map(AttemptRecord::from).collect())
}

fn attempt_entity(
    session: &AttemptSession,
    score: Option<i64>,
    status: AttemptStatus,
) -> AttemptEntity {
    AttemptEntity {
        subject: session.subject.clone(),
        song_hash: session.level.song_hash().to_string(),
        difficulty: session.level.difficulty(),
        level_key: session.level_key.0,
        score_id: session.score_id.0,
        score,
        status,
        opened_at: session.opened_at.into(),
        closed_at: (status != AttemptStatus::Open).then(SystemTime::now),
    }
}

/// Persist an attempt record. Failures are logged and never undo the attempt.
async fn record_attempt(state: &SharedState, attempt: AttemptEntity) {
    let Some(store) = state.match_store().await else {
        debug!(subject = %attempt.subject, score_id = attempt.score_id, "degraded mode; attempt not recorded");
        return;
    };

    let subject = attempt.subject.clone();
    let score_id = attempt.score_id;
    if let Err(err) = store.save_attempt(attempt).await {
        warn!(%subject, score_id, error = %err, "failed to record attempt");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::{MatchStore, memory::MemoryMatchStore},
            scoring::{Difficulty, fake::FakeGateway},
        },
        dto::qualifier::LevelInput,
        state::AppState,
    };

    const HASH: &str = "ab12cd34";

    async fn setup() -> (SharedState, Arc<FakeGateway>, Arc<MemoryMatchStore>) {
        let gateway = Arc::new(FakeGateway::new().with_level(HASH, Difficulty::Expert, 7));
        let state = AppState::new(AppConfig::default(), gateway.clone());
        let store = Arc::new(MemoryMatchStore::new());
        state.install_match_store(store.clone()).await;
        (state, gateway, store)
    }

    fn start_request(checked: bool) -> StartAttemptRequest {
        StartAttemptRequest {
            subject_id: "p1".into(),
            level: LevelInput {
                level_id: format!("custom_level_{HASH}"),
                difficulty: 3,
            },
            checked,
        }
    }

    #[tokio::test]
    async fn start_then_submit_is_recorded() {
        let (state, _gateway, store) = setup().await;

        let opened = start_attempt(&state, start_request(false)).await.unwrap();
        assert_eq!(opened.level_key, 7);

        let submitted = submit_attempt(
            &state,
            SubmitAttemptRequest {
                subject_id: "p1".into(),
                score: 912_345,
            },
        )
        .await
        .unwrap();
        assert_eq!(submitted.score, Some(912_345));

        let attempts = store.list_attempts("p1".into()).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, AttemptStatus::Submitted);
        assert_eq!(attempts[0].score, Some(912_345));
        assert!(attempts[0].closed_at.is_some());
    }

    #[tokio::test]
    async fn failed_submission_is_recorded_and_releases_the_player() {
        let (state, gateway, store) = setup().await;
        start_attempt(&state, start_request(false)).await.unwrap();
        gateway.fail_submit(true);

        let err = submit_attempt(
            &state,
            SubmitAttemptRequest {
                subject_id: "p1".into(),
                score: 1,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));

        let attempts = store.list_attempts("p1".into()).await.unwrap();
        assert_eq!(attempts[0].status, AttemptStatus::SubmitFailed);
        assert!(!state.qualifier().is_busy("p1"));
    }

    #[tokio::test]
    async fn checked_start_without_attempts_is_a_conflict() {
        let (state, gateway, store) = setup().await;
        gateway.set_remaining(0);

        let err = start_attempt(&state, start_request(true)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(store.list_attempts("p1".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_mode_still_runs_the_workflow() {
        let (state, _gateway, _store) = setup().await;
        state.clear_match_store().await;

        start_attempt(&state, start_request(false)).await.unwrap();
        assert!(state.qualifier().open_session("p1").is_some());
        assert!(matches!(
            attempt_history(&state, "p1".into()).await,
            Err(ServiceError::Degraded)
        ));
    }
}
