//! Strongly-typed REST calls with taxonomy-aware retry (§4.2).
//!
//! A send-loop-with-backoff shape where the retry decision is driven by the
//! typed [`SdkError`] taxonomy (§7), with two additional waits layered on
//! top of plain exponential backoff — `TooManyRequestsError`'s wall-clock
//! `recommendedRetryTime`, and HTTP 202's `retry-after` polling.

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::HttpClientConfig;
use crate::error::SdkError;

const TIMEOUT_MESSAGE: &str = "Timed out waiting for the end of the process of calculating metrics";

#[derive(Debug, Default, Deserialize)]
struct ServerErrorBody {
    error: Option<String>,
    message: Option<String>,
    #[serde(rename = "recommendedRetryTime")]
    recommended_retry_time: Option<String>,
}

/// REST client for the account management API (§4.2).
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
    auth_token: String,
}

impl HttpClient {
    /// Build a client bound to `config.base_url`, authenticating every
    /// call with `auth_token`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Internal`] if the underlying `reqwest::Client`
    /// fails to build (e.g. an invalid TLS configuration).
    pub fn new(config: HttpClientConfig, auth_token: impl Into<String>) -> Result<Self, SdkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| SdkError::Internal {
                message: err.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            auth_token: auth_token.into(),
        })
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SdkError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T, SdkError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T, SdkError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete(&self, path: &str) -> Result<(), SdkError> {
        let _: serde_json::Value = self.request::<_, ()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the typed [`SdkError`] the server reported once the
    /// retry/backoff/wait budget for that kind of failure (§4.2) is
    /// exhausted.
    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SdkError> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut retries_used = 0u32;
        let mut backoff = Duration::from_secs(1);
        let mut waited_for_202 = Duration::ZERO;
        let max_delay = Duration::from_secs(self.config.max_delay_in_seconds);

        loop {
            let mut request = self.client.request(method.clone(), url.as_str()).header("auth-token", &self.auth_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|err| SdkError::Api {
                code: "network".to_string(),
                message: err.to_string(),
            })?;

            let status = response.status();

            if status == StatusCode::ACCEPTED {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(1);
                let delay = Duration::from_secs(retry_after);

                if retry_after > self.config.max_delay_in_seconds || waited_for_202 + delay > max_delay {
                    return Err(SdkError::Timeout {
                        message: TIMEOUT_MESSAGE.to_string(),
                    });
                }

                tokio::time::sleep(delay).await;
                waited_for_202 += delay;
                continue;
            }

            if status.is_success() {
                let text = response.text().await.map_err(|err| SdkError::Internal {
                    message: err.to_string(),
                })?;
                let text = if text.is_empty() { "null" } else { text.as_str() };
                return serde_json::from_str(text).map_err(|err| SdkError::Internal {
                    message: format!("failed to decode response body: {err}"),
                });
            }

            let body_text = response.text().await.unwrap_or_default();
            let parsed: ServerErrorBody = serde_json::from_str(&body_text).unwrap_or_default();
            let error_name = parsed.error.clone().unwrap_or_else(|| status.as_u16().to_string());
            let message = parsed.message.clone().unwrap_or(body_text);

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_time = parsed
                    .recommended_retry_time
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
                    .unwrap_or_else(|| SystemTime::now() + max_delay + Duration::from_secs(1));

                let err = SdkError::TooManyRequests {
                    message,
                    recommended_retry_time: retry_time,
                };

                if let Ok(delay) = retry_time.duration_since(SystemTime::now()) {
                    if delay <= max_delay {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                return Err(err);
            }

            let err = SdkError::from_server(&error_name, message);
            if err.retryable() && retries_used < self.config.retries {
                retries_used += 1;
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(30));
                continue;
            }
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpClient {
        HttpClient::new(HttpClientConfig::new(server.uri()), "token123").unwrap()
    }

    #[tokio::test]
    async fn successful_get_decodes_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/accounts/accountId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "accountId"})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body: serde_json::Value = client.get("/users/accounts/accountId").await.unwrap();
        assert_eq!(body["id"], "accountId");
    }

    #[tokio::test]
    async fn retries_internal_error_up_to_the_configured_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "InternalError",
                "message": "try again",
            })))
            .mount(&server)
            .await;

        let config = HttpClientConfig::new(server.uri()).with_retries(1);
        let client = HttpClient::new(config, "token123").unwrap();

        let result: Result<serde_json::Value, SdkError> = client.get("/flaky").await;
        assert!(matches!(result, Err(SdkError::Internal { .. })));
    }

    #[tokio::test]
    async fn validation_error_surfaces_immediately_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad-request"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "ValidationError",
                "message": "volume is required",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result: Result<serde_json::Value, SdkError> = client.get("/bad-request").await;
        assert!(matches!(result, Err(SdkError::Validation { .. })));
    }

    #[tokio::test]
    async fn not_found_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "NotFoundError",
                "message": "no such order",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result: Result<serde_json::Value, SdkError> = client.get("/missing").await;
        assert!(matches!(result, Err(SdkError::NotFound { .. })));
    }

    #[tokio::test]
    async fn too_many_requests_within_budget_waits_and_retries_without_consuming_retry_credit() {
        let server = MockServer::start().await;
        let retry_at = (Utc::now() + chrono::Duration::milliseconds(50)).to_rfc3339();

        Mock::given(method("GET"))
            .and(path("/rate-limited"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": "TooManyRequestsError",
                "message": "slow down",
                "recommendedRetryTime": retry_at,
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rate-limited"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body: serde_json::Value = client.get("/rate-limited").await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn too_many_requests_beyond_budget_surfaces_immediately() {
        let server = MockServer::start().await;
        let retry_at = (Utc::now() + chrono::Duration::seconds(999)).to_rfc3339();

        Mock::given(method("GET"))
            .and(path("/rate-limited-forever"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": "TooManyRequestsError",
                "message": "slow down",
                "recommendedRetryTime": retry_at,
            })))
            .mount(&server)
            .await;

        let config = HttpClientConfig::new(server.uri()).with_max_delay_in_seconds(1);
        let client = HttpClient::new(config, "token123").unwrap();
        let result: Result<serde_json::Value, SdkError> = client.get("/rate-limited-forever").await;
        assert!(matches!(result, Err(SdkError::TooManyRequests { .. })));
    }

    #[tokio::test]
    async fn accepted_202_polls_retry_after_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calculating"))
            .respond_with(ResponseTemplate::new(202).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calculating"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"metrics": 42})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body: serde_json::Value = client.get("/calculating").await.unwrap();
        assert_eq!(body["metrics"], 42);
    }

    #[tokio::test]
    async fn accepted_202_beyond_max_delay_times_out_with_the_exact_spec_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/never-done"))
            .respond_with(ResponseTemplate::new(202).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let config = HttpClientConfig::new(server.uri()).with_max_delay_in_seconds(1);
        let client = HttpClient::new(config, "token123").unwrap();
        let result: Result<serde_json::Value, SdkError> = client.get("/never-done").await;
        match result {
            Err(SdkError::Timeout { message }) => assert_eq!(message, TIMEOUT_MESSAGE),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_decodes_unit_on_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/history/accountId"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.delete("/history/accountId").await.unwrap();
    }
}
