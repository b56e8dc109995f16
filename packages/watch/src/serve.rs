// ABOUTME: Webhook receiver for Pub/Sub push notifications
// ABOUTME: Configuration is validated before any socket opens; unauthenticated non-loopback binds are refused

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{WatchError, WatchResult};
use crate::verify::{NotificationVerifier, VerifyMode};

/// Receiver configuration. `validate` runs before any bind.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
    pub path: String,
    pub shared_token: Option<String>,
    pub verify_oidc: bool,
    pub audience: Option<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            path: "/webhook".to_string(),
            shared_token: None,
            verify_oidc: false,
            audience: None,
        }
    }
}

impl ServeConfig {
    /// Reject a bad configuration before a socket is opened. A non-loopback
    /// bind with no authentication would expose an open receiver, so it
    /// fails fast here.
    pub fn validate(&self) -> WatchResult<()> {
        if !self.path.starts_with('/') {
            return Err(WatchError::InvalidConfig(
                "--path must start with '/'".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(WatchError::InvalidConfig(
                "--port must be > 0".to_string(),
            ));
        }
        if !self.is_loopback() && self.shared_token.is_none() && !self.verify_oidc {
            return Err(WatchError::InvalidConfig(
                "--verify-oidc or --token required for non-loopback bind".to_string(),
            ));
        }
        Ok(())
    }

    fn is_loopback(&self) -> bool {
        if self.bind == "localhost" {
            return true;
        }
        self.bind
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    fn verify_mode(&self) -> VerifyMode {
        if self.verify_oidc {
            VerifyMode::Oidc {
                audience: self.audience.clone(),
            }
        } else if let Some(token) = &self.shared_token {
            VerifyMode::SharedToken(token.clone())
        } else {
            VerifyMode::None
        }
    }
}

/// Pub/Sub push envelope.
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
    #[serde(default)]
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(default)]
    data: Option<String>,
    #[serde(rename = "messageId")]
    message_id: String,
}

/// Decoded Gmail notification payload.
#[derive(Debug, Deserialize)]
struct GmailNotification {
    #[serde(rename = "emailAddress")]
    email_address: String,
    #[serde(rename = "historyId")]
    history_id: serde_json::Value,
}

/// Run the receiver until interrupted. Validation happens before the bind.
pub async fn serve(config: ServeConfig) -> WatchResult<()> {
    config.validate()?;

    let verifier = Arc::new(NotificationVerifier::new(config.verify_mode()));
    let app = router(verifier, &config.path);

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!(bind = %config.bind, port = config.port, path = %config.path, "webhook receiver listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("webhook receiver shutting down");
        })
        .await?;
    Ok(())
}

fn router(verifier: Arc<NotificationVerifier>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_notification))
        .with_state(verifier)
}

async fn handle_notification(
    State(verifier): State<Arc<NotificationVerifier>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(envelope): Json<PushEnvelope>,
) -> impl IntoResponse {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let query_token = params.get("token").map(String::as_str);

    if verifier.requires_auth() && bearer.is_none() && query_token.is_none() {
        warn!("notification without credentials rejected");
        return (StatusCode::UNAUTHORIZED, "authentication required");
    }
    if let Err(e) = verifier.verify(bearer, query_token).await {
        warn!("notification rejected: {}", e);
        return (StatusCode::FORBIDDEN, "verification failed");
    }

    // Notifications carry no ordering guarantee; historyId is the authority
    // for event order, arrival order is meaningless.
    match decode_notification(&envelope) {
        Some(notification) => {
            info!(
                message_id = %envelope.message.message_id,
                subscription = envelope.subscription.as_deref().unwrap_or(""),
                email = %notification.email_address,
                history_id = %notification.history_id,
                "notification received"
            );
        }
        None => {
            info!(
                message_id = %envelope.message.message_id,
                "notification received without decodable payload"
            );
        }
    }

    (StatusCode::NO_CONTENT, "")
}

fn decode_notification(envelope: &PushEnvelope) -> Option<GmailNotification> {
    let data = envelope.message.data.as_deref()?;
    let decoded = BASE64.decode(data).ok()?;
    serde_json::from_slice(&decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn envelope_body() -> String {
        let payload = BASE64.encode(br#"{"emailAddress":"a@b.com","historyId":12345}"#);
        format!(
            r#"{{"message":{{"data":"{}","messageId":"m1"}},"subscription":"projects/p/subscriptions/s"}}"#,
            payload
        )
    }

    fn post_envelope(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
        }
        builder.body(Body::from(envelope_body())).unwrap()
    }

    #[test]
    fn test_validate_rejects_bad_path() {
        let config = ServeConfig {
            path: "nope".to_string(),
            ..ServeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("--path must start"));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let config = ServeConfig {
            port: 0,
            ..ServeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("--port must be > 0"));
    }

    #[test]
    fn test_validate_refuses_open_receiver_on_public_bind() {
        let config = ServeConfig {
            bind: "0.0.0.0".to_string(),
            ..ServeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("--verify-oidc or --token required"));

        // Either mechanism satisfies the requirement.
        let with_token = ServeConfig {
            bind: "0.0.0.0".to_string(),
            shared_token: Some("s".to_string()),
            ..ServeConfig::default()
        };
        with_token.validate().unwrap();

        let with_oidc = ServeConfig {
            bind: "0.0.0.0".to_string(),
            verify_oidc: true,
            ..ServeConfig::default()
        };
        with_oidc.validate().unwrap();
    }

    #[test]
    fn test_validate_accepts_loopback_without_auth() {
        ServeConfig::default().validate().unwrap();
        let localhost = ServeConfig {
            bind: "localhost".to_string(),
            ..ServeConfig::default()
        };
        localhost.validate().unwrap();
    }

    #[tokio::test]
    async fn test_notification_accepted_without_auth_on_none_mode() {
        let app = router(
            Arc::new(NotificationVerifier::new(VerifyMode::None)),
            "/webhook",
        );
        let response = app.oneshot(post_envelope("/webhook", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_notification_with_shared_token() {
        let app = router(
            Arc::new(NotificationVerifier::new(VerifyMode::SharedToken(
                "s3cret".to_string(),
            ))),
            "/webhook",
        );
        let response = app
            .oneshot(post_envelope("/webhook?token=s3cret", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_notification_missing_credentials_is_401() {
        let app = router(
            Arc::new(NotificationVerifier::new(VerifyMode::SharedToken(
                "s3cret".to_string(),
            ))),
            "/webhook",
        );
        let response = app.oneshot(post_envelope("/webhook", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_notification_wrong_token_is_403() {
        let app = router(
            Arc::new(NotificationVerifier::new(VerifyMode::SharedToken(
                "s3cret".to_string(),
            ))),
            "/webhook",
        );
        let response = app
            .oneshot(post_envelope("/webhook?token=wrong", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
