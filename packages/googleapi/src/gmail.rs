// ABOUTME: Gmail push-notification watch client (users/me/watch, users/me/stop)
// ABOUTME: Retries transient failures and trips the circuit breaker on repeated ones

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::retry::{parse_retry_after, CircuitBreaker, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// A registered (or re-registered) watch subscription as reported by Gmail.
#[derive(Debug, Clone)]
pub struct WatchRegistration {
    /// Opaque cursor marking the point from which changes are reported.
    pub history_id: String,
    /// Subscription expiry, milliseconds since the Unix epoch.
    pub expiration_ms: i64,
}

/// The watch begin/stop operations consumed by the watch lifecycle.
///
/// Gmail's subscription model is re-registration: calling watch on an account
/// that already has one replaces it and returns fresh historyId/expiration.
#[async_trait]
pub trait WatchApi: Send + Sync {
    async fn watch(&self, topic: &str, label_ids: &[String]) -> ApiResult<WatchRegistration>;
    async fn stop(&self) -> ApiResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchRequestBody<'a> {
    topic_name: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    label_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponseBody {
    history_id: String,
    expiration: String,
}

/// HTTP Gmail watch client for a single account's access token.
pub struct GmailWatchClient {
    http: Client,
    base_url: String,
    access_token: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl GmailWatchClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client against a non-default endpoint (used by tests).
    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        }
    }

    /// POST a JSON body and return the successful response, retrying 429/5xx
    /// per the retry policy. `resource` names the operation for error context.
    async fn post_json(
        &self,
        path: &str,
        resource: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0u32;

        loop {
            self.breaker.check()?;

            let mut req = self
                .http
                .post(&url)
                .bearer_auth(&self.access_token)
                .header("Accept", "application/json");
            if let Some(body) = &body {
                req = req.json(body);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(ApiError::Http {
                        operation: resource.to_string(),
                        source: e,
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                self.breaker.record_success();
                return Ok(response);
            }

            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok()),
            );

            let transient =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if transient && self.retry.should_retry(retries) {
                let delay = self.retry.delay_for(retries, retry_after);
                retries += 1;
                debug!(%status, ?delay, retries, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            self.breaker.record_failure();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ApiError::RateLimit {
                    retry_after,
                    retries,
                });
            }
            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(
                status.as_u16(),
                resource,
                &body_text,
                retry_after,
            ));
        }
    }
}

#[async_trait]
impl WatchApi for GmailWatchClient {
    async fn watch(&self, topic: &str, label_ids: &[String]) -> ApiResult<WatchRegistration> {
        let body = serde_json::to_value(WatchRequestBody {
            topic_name: topic,
            label_ids,
        })
        .map_err(|e| ApiError::InvalidResponse {
            operation: "gmail watch".to_string(),
            message: e.to_string(),
        })?;

        let response = self
            .post_json("/users/me/watch", "gmail watch", Some(body))
            .await?;

        let parsed: WatchResponseBody =
            response
                .json()
                .await
                .map_err(|e| ApiError::InvalidResponse {
                    operation: "gmail watch".to_string(),
                    message: e.to_string(),
                })?;

        let expiration_ms =
            parsed
                .expiration
                .parse::<i64>()
                .map_err(|_| ApiError::InvalidResponse {
                    operation: "gmail watch".to_string(),
                    message: format!("non-numeric expiration: {}", parsed.expiration),
                })?;

        info!(
            history_id = %parsed.history_id,
            expiration_ms,
            "gmail watch registered"
        );
        Ok(WatchRegistration {
            history_id: parsed.history_id,
            expiration_ms,
        })
    }

    async fn stop(&self) -> ApiResult<()> {
        self.post_json("/users/me/stop", "gmail watch stop", None)
            .await?;
        info!("gmail watch stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::HeaderMap,
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use std::sync::{Arc, Mutex};

    /// Scripted Gmail endpoint: serves `initial_429s` rate-limit responses
    /// before succeeding, recording each request for assertions.
    #[derive(Default)]
    struct MockGmail {
        initial_429s: u32,
        watch_calls: u32,
        stop_calls: u32,
        last_authorization: Option<String>,
        last_body: Option<serde_json::Value>,
    }

    async fn start_mock(initial_429s: u32) -> (String, Arc<Mutex<MockGmail>>) {
        let state = Arc::new(Mutex::new(MockGmail {
            initial_429s,
            ..MockGmail::default()
        }));
        let app = Router::new()
            .route("/users/me/watch", post(mock_watch))
            .route("/users/me/stop", post(mock_stop))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    async fn mock_watch(
        State(state): State<Arc<Mutex<MockGmail>>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        let mut state = state.lock().unwrap();
        state.watch_calls += 1;
        state.last_authorization = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        state.last_body = Some(body);

        if state.initial_429s > 0 {
            state.initial_429s -= 1;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", "0")],
                "slow down",
            )
                .into_response();
        }
        Json(serde_json::json!({
            "historyId": "777",
            "expiration": "1730000000000",
        }))
        .into_response()
    }

    async fn mock_stop(State(state): State<Arc<Mutex<MockGmail>>>) -> StatusCode {
        state.lock().unwrap().stop_calls += 1;
        StatusCode::NO_CONTENT
    }

    #[tokio::test]
    async fn test_watch_retries_transient_429_then_succeeds() {
        let (base_url, state) = start_mock(1).await;
        let client = GmailWatchClient::with_base_url("tok".to_string(), base_url);

        let registration = client
            .watch("projects/p/topics/t", &["INBOX".to_string()])
            .await
            .unwrap();
        assert_eq!(registration.history_id, "777");
        assert_eq!(registration.expiration_ms, 1_730_000_000_000);

        let state = state.lock().unwrap();
        assert_eq!(state.watch_calls, 2);
        assert_eq!(state.last_authorization.as_deref(), Some("Bearer tok"));
        let body = state.last_body.as_ref().unwrap();
        assert_eq!(body["topicName"], "projects/p/topics/t");
        assert_eq!(body["labelIds"][0], "INBOX");
    }

    #[tokio::test]
    async fn test_watch_rate_limit_exhaustion_reports_retries() {
        let (base_url, state) = start_mock(10).await;
        let client = GmailWatchClient::with_base_url("tok".to_string(), base_url);

        let err = client.watch("projects/p/topics/t", &[]).await.err().unwrap();
        match err {
            ApiError::RateLimit {
                retry_after,
                retries,
            } => {
                assert_eq!(retry_after, Some(std::time::Duration::from_secs(0)));
                assert_eq!(retries, 3);
            }
            other => panic!("expected RateLimit, got: {}", other),
        }
        // Initial request plus max_retries attempts.
        assert_eq!(state.lock().unwrap().watch_calls, 4);
    }

    #[tokio::test]
    async fn test_stop_posts_to_stop_endpoint() {
        let (base_url, state) = start_mock(0).await;
        let client = GmailWatchClient::with_base_url("tok".to_string(), base_url);

        client.stop().await.unwrap();
        assert_eq!(state.lock().unwrap().stop_calls, 1);
        assert_eq!(state.lock().unwrap().watch_calls, 0);
    }

    #[test]
    fn test_watch_request_serialization() {
        let body = WatchRequestBody {
            topic_name: "projects/p/topics/t",
            label_ids: &["INBOX".to_string()],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["topicName"], "projects/p/topics/t");
        assert_eq!(json["labelIds"][0], "INBOX");
    }

    #[test]
    fn test_watch_request_omits_empty_labels() {
        let body = WatchRequestBody {
            topic_name: "projects/p/topics/t",
            label_ids: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("labelIds").is_none());
    }

    #[test]
    fn test_watch_response_parsing() {
        let parsed: WatchResponseBody =
            serde_json::from_str(r#"{"historyId":"123","expiration":"1730000000000"}"#).unwrap();
        assert_eq!(parsed.history_id, "123");
        assert_eq!(parsed.expiration.parse::<i64>().unwrap(), 1_730_000_000_000);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            GmailWatchClient::with_base_url("tok".to_string(), "http://x/".to_string());
        assert_eq!(client.base_url, "http://x");
    }
}
