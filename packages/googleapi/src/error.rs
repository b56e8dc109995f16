// ABOUTME: Error taxonomy for Google API operations
// ABOUTME: Tagged union with structured fields; callers match on variant, not message text

use std::time::Duration;

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by Google API operations.
///
/// Variants carry structured fields so callers can branch on kind instead of
/// parsing message strings.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Credential missing or expired for an account/service pair. The email
    /// is omitted from the message when the account is not known.
    #[error("{}", auth_required_message(.service, .email))]
    AuthRequired { service: String, email: String },

    /// The provider rate-limited us. Carries whichever of retry-after and
    /// retry count drove the decision; the message states which.
    #[error("{}", rate_limit_message(.retry_after, *.retries))]
    RateLimit {
        retry_after: Option<Duration>,
        retries: u32,
    },

    /// Fail-fast short-circuit: no remote call was attempted.
    #[error("circuit breaker open: request not attempted")]
    CircuitBreaker,

    /// Project or user quota exhausted for a resource.
    #[error("quota exceeded for {resource}")]
    QuotaExceeded { resource: String },

    /// Resource does not exist. The id is omitted from the message when absent.
    #[error("{}", not_found_message(.resource, .id))]
    NotFound {
        resource: String,
        id: Option<String>,
    },

    /// Caller lacks permission. The message names the action when one is known.
    #[error("{}", permission_denied_message(.resource, .action))]
    PermissionDenied {
        resource: String,
        action: Option<String>,
    },

    /// Transport-level failure, wrapped with the operation that was attempted.
    #[error("{operation}: {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// Provider returned an unexpected status with no recognizable kind.
    #[error("{operation}: unexpected status {status}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    /// Provider response could not be decoded.
    #[error("{operation}: invalid response: {message}")]
    InvalidResponse { operation: String, message: String },
}

fn auth_required_message(service: &str, email: &str) -> String {
    if email.is_empty() {
        format!("authentication required for {}; run 'gwc auth login'", service)
    } else {
        format!(
            "authentication required for {} ({}); run 'gwc auth login'",
            service, email
        )
    }
}

fn rate_limit_message(retry_after: &Option<Duration>, retries: u32) -> String {
    match (retry_after, retries) {
        (Some(d), 0) => format!("rate limited: retry after {}s", d.as_secs()),
        (Some(d), n) => format!(
            "rate limited: retry after {}s (after {} retries)",
            d.as_secs(),
            n
        ),
        (None, n) if n > 0 => format!("rate limited after {} retries", n),
        (None, _) => "rate limited".to_string(),
    }
}

fn not_found_message(resource: &str, id: &Option<String>) -> String {
    match id {
        Some(id) => format!("{} not found: {}", resource, id),
        None => format!("{} not found", resource),
    }
}

fn permission_denied_message(resource: &str, action: &Option<String>) -> String {
    match action {
        Some(action) => format!("permission denied: cannot {} {}", action, resource),
        None => format!("permission denied for {}", resource),
    }
}

impl ApiError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, ApiError::AuthRequired { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimit { .. })
    }

    pub fn is_circuit_breaker(&self) -> bool {
        matches!(self, ApiError::CircuitBreaker)
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, ApiError::QuotaExceeded { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ApiError::PermissionDenied { .. })
    }

    /// Map an error response from a Google API to a taxonomy kind.
    ///
    /// `resource` names what was being operated on (for NotFound / quota /
    /// permission messages); `retry_after` is the parsed Retry-After header
    /// when the provider sent one.
    pub fn from_status(
        status: u16,
        resource: &str,
        body: &str,
        retry_after: Option<Duration>,
    ) -> ApiError {
        match status {
            401 => ApiError::AuthRequired {
                service: resource.to_string(),
                email: String::new(),
            },
            403 if body_has_reason(body, &["rateLimitExceeded", "userRateLimitExceeded"]) => {
                ApiError::RateLimit {
                    retry_after,
                    retries: 0,
                }
            }
            403 if body_has_reason(body, &["quotaExceeded", "dailyLimitExceeded"]) => {
                ApiError::QuotaExceeded {
                    resource: resource.to_string(),
                }
            }
            403 => ApiError::PermissionDenied {
                resource: resource.to_string(),
                action: None,
            },
            404 => ApiError::NotFound {
                resource: resource.to_string(),
                id: None,
            },
            429 => ApiError::RateLimit {
                retry_after,
                retries: 0,
            },
            _ => ApiError::UnexpectedStatus {
                operation: resource.to_string(),
                status,
                body: body.to_string(),
            },
        }
    }
}

/// Check the Google error envelope (`{"error":{"errors":[{"reason":...}]}}`)
/// for one of the given reasons without requiring a full deserialization.
fn body_has_reason(body: &str, reasons: &[&str]) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let Some(errors) = value
        .get("error")
        .and_then(|e| e.get("errors"))
        .and_then(|e| e.as_array())
    else {
        return false;
    };
    errors.iter().any(|e| {
        e.get("reason")
            .and_then(|r| r.as_str())
            .is_some_and(|r| reasons.contains(&r))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_helpers() {
        assert!(ApiError::AuthRequired {
            service: "gmail".to_string(),
            email: "a@b.com".to_string()
        }
        .is_auth_required());
        assert!(ApiError::RateLimit {
            retry_after: Some(Duration::from_secs(1)),
            retries: 2
        }
        .is_rate_limit());
        assert!(ApiError::CircuitBreaker.is_circuit_breaker());
        assert!(ApiError::QuotaExceeded {
            resource: "gmail".to_string()
        }
        .is_quota_exceeded());
        assert!(ApiError::NotFound {
            resource: "msg".to_string(),
            id: Some("id".to_string())
        }
        .is_not_found());
        assert!(ApiError::PermissionDenied {
            resource: "file".to_string(),
            action: Some("read".to_string())
        }
        .is_permission_denied());

        // Kinds are disjoint
        assert!(!ApiError::CircuitBreaker.is_rate_limit());
        assert!(!ApiError::NotFound {
            resource: "msg".to_string(),
            id: None
        }
        .is_permission_denied());
    }

    #[test]
    fn test_rate_limit_messages() {
        let err = ApiError::RateLimit {
            retry_after: Some(Duration::from_secs(2)),
            retries: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("retry after 2s"), "got: {}", msg);
        assert!(msg.contains("after 3 retries"), "got: {}", msg);

        let err = ApiError::RateLimit {
            retry_after: None,
            retries: 1,
        };
        assert!(err.to_string().contains("after 1 retries"));

        let err = ApiError::RateLimit {
            retry_after: None,
            retries: 0,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_auth_required_messages() {
        let err = ApiError::AuthRequired {
            service: "gmail".to_string(),
            email: "a@b.com".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "authentication required for gmail (a@b.com); run 'gwc auth login'"
        );

        // A 401 mapped without a known account must not render empty parens.
        let err = ApiError::from_status(401, "gmail watch", "", None);
        assert_eq!(
            err.to_string(),
            "authentication required for gmail watch; run 'gwc auth login'"
        );
    }

    #[test]
    fn test_not_found_messages() {
        let err = ApiError::NotFound {
            resource: "file".to_string(),
            id: None,
        };
        assert_eq!(err.to_string(), "file not found");

        let err = ApiError::NotFound {
            resource: "file".to_string(),
            id: Some("id1".to_string()),
        };
        assert_eq!(err.to_string(), "file not found: id1");
    }

    #[test]
    fn test_permission_denied_messages() {
        let err = ApiError::PermissionDenied {
            resource: "file".to_string(),
            action: None,
        };
        assert_eq!(err.to_string(), "permission denied for file");

        let err = ApiError::PermissionDenied {
            resource: "file".to_string(),
            action: Some("delete".to_string()),
        };
        assert_eq!(err.to_string(), "permission denied: cannot delete file");
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(ApiError::from_status(401, "gmail", "", None).is_auth_required());
        assert!(ApiError::from_status(404, "message", "", None).is_not_found());
        assert!(ApiError::from_status(429, "gmail", "", None).is_rate_limit());
        assert!(ApiError::from_status(403, "file", "{}", None).is_permission_denied());

        let quota_body = r#"{"error":{"errors":[{"reason":"quotaExceeded"}]}}"#;
        assert!(ApiError::from_status(403, "gmail", quota_body, None).is_quota_exceeded());

        let rate_body = r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        assert!(ApiError::from_status(403, "gmail", rate_body, None).is_rate_limit());
    }

    #[test]
    fn test_from_status_keeps_retry_after() {
        let err = ApiError::from_status(429, "gmail", "", Some(Duration::from_secs(7)));
        match err {
            ApiError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimit, got: {}", other),
        }
    }
}
