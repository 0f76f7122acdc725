// src/utils/grading.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::{
    config::Config,
    error::AppError,
    models::{
        attempt::AttemptPayload,
        submission::{GradedResult, SubmissionRequest},
    },
};

/// The remote grading collaborator: attempt fetch and the single submit call.
#[async_trait]
pub trait GradingService: Send + Sync {
    async fn fetch_attempt(&self, attempt_id: &str) -> Result<AttemptPayload, AppError>;

    async fn submit(
        &self,
        attempt_id: &str,
        request: &SubmissionRequest,
    ) -> Result<GradedResult, AppError>;
}

/// `GradingService` over HTTP with a bearer credential.
pub struct HttpGradingClient {
    base_url: Url,
    token: String,
    http_client: reqwest::Client,
}

impl HttpGradingClient {
    pub fn new(base_url: Url, token: String, timeout: Duration) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            token,
            http_client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.grading_api_url.clone(),
            config.api_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn attempt_url(&self, attempt_id: &str) -> String {
        format!(
            "{}/api/quiz/attempts/{}",
            self.base_url.as_str().trim_end_matches('/'),
            attempt_id
        )
    }
}

/// Maps a non-success status from the grading service onto the error taxonomy.
fn status_error(status: StatusCode, attempt_id: &str, body: String) -> AppError {
    match status {
        StatusCode::NOT_FOUND => AppError::AttemptNotFound(attempt_id.to_string()),
        StatusCode::UNAUTHORIZED => AppError::Unauthenticated(body),
        s if s == StatusCode::FORBIDDEN || s.as_u16() == 419 || s.as_u16() == 440 => {
            AppError::SessionExpired(body)
        }
        s => AppError::NetworkFailure(format!("grading service returned {}: {}", s.as_u16(), body)),
    }
}

#[async_trait]
impl GradingService for HttpGradingClient {
    async fn fetch_attempt(&self, attempt_id: &str) -> Result<AttemptPayload, AppError> {
        let url = self.attempt_url(attempt_id);
        tracing::debug!("Fetching attempt from {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| AppError::NetworkFailure(format!("malformed attempt payload: {}", e)))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Attempt fetch failed ({}): {}", status, body);
            Err(status_error(status, attempt_id, body))
        }
    }

    async fn submit(
        &self,
        attempt_id: &str,
        request: &SubmissionRequest,
    ) -> Result<GradedResult, AppError> {
        let url = format!("{}/submit", self.attempt_url(attempt_id));

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| AppError::NetworkFailure(format!("malformed grading result: {}", e)))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Submission failed ({}): {}", status, body);
            Err(status_error(status, attempt_id, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "q1", String::new()),
            AppError::AttemptNotFound("q1".to_string())
        );
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "q1", String::new()),
            AppError::Unauthenticated(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "q1", String::new()),
            AppError::SessionExpired(_)
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "q1", String::new()),
            AppError::NetworkFailure(_)
        ));
    }

    #[test]
    fn test_attempt_url_ignores_trailing_slash() {
        let client = HttpGradingClient::new(
            Url::parse("http://grader.local/").unwrap(),
            "t".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.attempt_url("a1"),
            "http://grader.local/api/quiz/attempts/a1"
        );
    }
}
