use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::dao::scoring::{
    CatalogEntry, Credential, Difficulty, LevelKey, LevelRef, ScoreId, ScoringError,
    ScoringGateway, ScoringOperation, ScoringResult, SubjectId,
};

use super::{
    config::ScoringConfig,
    models::{
        ATTEMPTS_QUERY, AttemptsData, CREATE_SCORE_MUTATION, CallFailure, CreateScoreData,
        GraphQlRequest,
        GraphQlResponse, LEVELS_QUERY, LOGIN_MUTATION, LevelVariables, LevelsData, LoginData,
        LoginVariables, NoVariables, SUBMIT_SCORE_MUTATION, SubmitScoreData, SubmitVariables,
        token_expiry,
    },
};

/// [`ScoringGateway`] speaking GraphQL over HTTP.
#[derive(Clone)]
pub struct GraphQlScoringGateway {
    client: Client,
    endpoint: Arc<str>,
}

impl GraphQlScoringGateway {
    /// Build the HTTP client used for every remote call.
    pub fn new(config: &ScoringConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: Arc::from(config.endpoint.as_str()),
        })
    }

    async fn execute<V, T>(
        &self,
        operation: ScoringOperation,
        operation_name: &str,
        query: &'static str,
        variables: V,
        token: Option<&str>,
    ) -> ScoringResult<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        self.exchange(operation_name, query, variables, token)
            .await
            .map_err(|failure| failure.into_remote(operation))
    }

    /// Run one GraphQL request and decode its `data` member.
    async fn exchange<V, T>(
        &self,
        operation_name: &str,
        query: &'static str,
        variables: V,
        token: Option<&str>,
    ) -> Result<T, CallFailure>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let body = GraphQlRequest {
            query,
            operation_name,
            variables,
        };

        let mut builder = self.client.post(self.endpoint.as_ref()).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        // Timeouts surface here like any other transport failure.
        let response = builder
            .send()
            .await
            .map_err(|err| CallFailure::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CallFailure::Rejected(format!("response status {status}")));
        }
        if !status.is_success() {
            return Err(CallFailure::Transport(format!(
                "unexpected response status {status}"
            )));
        }

        response
            .json::<GraphQlResponse<T>>()
            .await
            .map_err(|err| CallFailure::Transport(format!("malformed response: {err}")))?
            .into_data()
    }

    async fn login(&self, subject: SubjectId) -> ScoringResult<Credential> {
        let login: Result<LoginData, _> = self
            .exchange("Login", LOGIN_MUTATION, LoginVariables { user_id: &subject }, None)
            .await;
        let data = match login {
            Ok(data) => data,
            Err(CallFailure::Rejected(reason)) => {
                warn!(subject = %subject, %reason, "login refused");
                return Err(ScoringError::AuthenticationFailed { subject, reason });
            }
            Err(failure) => return Err(failure.into_remote(ScoringOperation::Authenticate)),
        };

        let Some(token) = data.authenticate_player.and_then(|payload| payload.jwt_token) else {
            return Err(ScoringError::AuthenticationFailed {
                subject,
                reason: "no token issued".into(),
            });
        };

        let Some(expires_at) = token_expiry(&token) else {
            return Err(ScoringError::AuthenticationFailed {
                subject,
                reason: "issued token carries no readable expiry".into(),
            });
        };

        debug!(subject = %subject, %expires_at, "credential issued");
        Ok(Credential {
            subject,
            token,
            expires_at,
        })
    }

    async fn levels(&self, credential: Credential) -> ScoringResult<Vec<CatalogEntry>> {
        let data: LevelsData = self
            .execute(
                ScoringOperation::FetchCatalog,
                "GetLevels",
                LEVELS_QUERY,
                NoVariables {},
                Some(&credential.token),
            )
            .await?;

        let mut entries = Vec::with_capacity(data.levels.nodes.len());
        for node in data.levels.nodes {
            match Difficulty::from_label(&node.difficulty) {
                Some(difficulty) => entries.push(CatalogEntry {
                    level: LevelRef::new(&node.song_hash, difficulty),
                    key: LevelKey(node.id),
                }),
                None => warn!(
                    level_id = node.id,
                    difficulty = %node.difficulty,
                    "skipping catalog entry with unknown difficulty"
                ),
            }
        }

        Ok(entries)
    }

    async fn remaining_attempts(
        &self,
        credential: Credential,
        key: LevelKey,
    ) -> ScoringResult<i64> {
        let operation = ScoringOperation::QueryRemainingAttempts;
        let data: AttemptsData = self
            .execute(
                operation,
                "AttemptsRemaining",
                ATTEMPTS_QUERY,
                LevelVariables { level_id: key.0 },
                Some(&credential.token),
            )
            .await?;

        data.level
            .map(|level| level.remaining_attempts)
            .ok_or_else(|| ScoringError::remote(operation, format!("level {key} not found")))
    }

    async fn open_score(&self, credential: Credential, key: LevelKey) -> ScoringResult<ScoreId> {
        let operation = ScoringOperation::CreateScore;
        let data: CreateScoreData = self
            .execute(
                operation,
                "CreateScore",
                CREATE_SCORE_MUTATION,
                LevelVariables { level_id: key.0 },
                Some(&credential.token),
            )
            .await?;

        data.create_qualifier_score
            .and_then(|payload| payload.qualifier_score)
            .map(|score| ScoreId(score.id))
            .ok_or_else(|| ScoringError::remote(operation, "no score row returned"))
    }

    async fn close_score(
        &self,
        credential: Credential,
        score_id: ScoreId,
        score: i64,
    ) -> ScoringResult<()> {
        let operation = ScoringOperation::SubmitScore;
        let data: SubmitScoreData = self
            .execute(
                operation,
                "SubmitScore",
                SUBMIT_SCORE_MUTATION,
                SubmitVariables {
                    score_id: score_id.0,
                    score,
                },
                Some(&credential.token),
            )
            .await?;

        let updated = data
            .update_qualifier_score
            .and_then(|payload| payload.qualifier_score)
            .ok_or_else(|| {
                ScoringError::remote(operation, format!("score row {score_id} was not updated"))
            })?;

        debug!(
            score_id = updated.id,
            score = ?updated.score,
            time_set = ?updated.time_set,
            "score submitted"
        );
        Ok(())
    }
}

impl ScoringGateway for GraphQlScoringGateway {
    fn authenticate(&self, subject: SubjectId) -> BoxFuture<'static, ScoringResult<Credential>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.login(subject).await })
    }

    fn fetch_catalog(
        &self,
        credential: Credential,
    ) -> BoxFuture<'static, ScoringResult<Vec<CatalogEntry>>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.levels(credential).await })
    }

    fn query_remaining_attempts(
        &self,
        credential: Credential,
        key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<i64>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.remaining_attempts(credential, key).await })
    }

    fn create_score(
        &self,
        credential: Credential,
        key: LevelKey,
    ) -> BoxFuture<'static, ScoringResult<ScoreId>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.open_score(credential, key).await })
    }

    fn submit_score(
        &self,
        credential: Credential,
        score_id: ScoreId,
        score: i64,
    ) -> BoxFuture<'static, ScoringResult<()>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.close_score(credential, score_id, score).await })
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, routing::post};
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use serde_json::{Value, json};

    use super::*;
    use crate::error::QualifierError;

    /// Serve `body` with `status` for every GraphQL request.
    async fn stub(status: StatusCode, body: Value) -> GraphQlScoringGateway {
        let app = Router::new().route(
            "/graphql",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        GraphQlScoringGateway::new(&ScoringConfig::new(format!("http://{addr}/graphql"))).unwrap()
    }

    fn credential() -> Credential {
        Credential {
            subject: "p1".into(),
            token: "token".into(),
            expires_at: time::OffsetDateTime::now_utc() + time::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn login_issues_credential_from_jwt() {
        let jwt = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(r#"{"exp":1900000000}"#)
        );
        let gateway = stub(
            StatusCode::OK,
            json!({"data": {"authenticatePlayer": {"jwtToken": jwt}}}),
        )
        .await;

        let credential = gateway.authenticate("p1".into()).await.unwrap();
        assert_eq!(credential.subject, "p1");
        assert_eq!(credential.expires_at.unix_timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn refused_login_is_an_authentication_failure() {
        let gateway = stub(
            StatusCode::OK,
            json!({"data": {"authenticatePlayer": null}, "errors": [{"message": "unknown player"}]}),
        )
        .await;

        match gateway.authenticate("p1".into()).await {
            Err(ScoringError::AuthenticationFailed { subject, reason }) => {
                assert_eq!(subject, "p1");
                assert_eq!(reason, "unknown player");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_login_is_an_authentication_failure() {
        let gateway = stub(StatusCode::UNAUTHORIZED, json!({})).await;

        let err = gateway.authenticate("p1".into()).await.unwrap_err();
        assert!(matches!(
            QualifierError::from(err),
            QualifierError::AuthenticationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn server_error_during_login_stays_remote() {
        let gateway = stub(StatusCode::INTERNAL_SERVER_ERROR, json!({})).await;

        assert!(matches!(
            gateway.authenticate("p1".into()).await,
            Err(ScoringError::Remote {
                operation: ScoringOperation::Authenticate,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unreachable_authority_stays_remote() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gateway =
            GraphQlScoringGateway::new(&ScoringConfig::new(format!("http://{addr}/graphql")))
                .unwrap();

        assert!(matches!(
            gateway.authenticate("p1".into()).await,
            Err(ScoringError::Remote {
                operation: ScoringOperation::Authenticate,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn missing_data_is_a_remote_failure() {
        let gateway = stub(StatusCode::OK, json!({"data": null})).await;

        assert!(matches!(
            gateway.fetch_catalog(credential()).await,
            Err(ScoringError::Remote {
                operation: ScoringOperation::FetchCatalog,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn non_success_status_is_a_remote_failure() {
        let gateway = stub(StatusCode::BAD_GATEWAY, json!({})).await;

        match gateway.create_score(credential(), LevelKey(7)).await {
            Err(ScoringError::Remote { operation, message }) => {
                assert_eq!(operation, ScoringOperation::CreateScore);
                assert!(message.contains("502"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn catalog_skips_unknown_difficulties() {
        let gateway = stub(
            StatusCode::OK,
            json!({"data": {"levels": {"nodes": [
                {"id": 7, "songHash": "AB12CD34", "difficulty": "EXPERT"},
                {"id": 8, "songHash": "AB12CD34", "difficulty": "LEGENDARY"}
            ]}}}),
        )
        .await;

        let catalog = gateway.fetch_catalog(credential()).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].key, LevelKey(7));
    }
}
