// ABOUTME: Error types for account resolution and OAuth flows
// ABOUTME: Local validation failures (CSRF, state, missing code) never reach the provider

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Callback `state` did not match the in-flight authorization attempt.
    /// A mismatch is a potential CSRF on the OAuth dance and always hard-fails.
    #[error("state mismatch: authorization response does not belong to this attempt")]
    StateMismatch,

    #[error("authorization callback missing code parameter")]
    MissingCode,

    #[error("invalid CSRF token")]
    CsrfRejected,

    #[error("account not found: {email}")]
    AccountNotFound { email: String },

    #[error("no accounts configured; run 'gwc auth login'")]
    NoAccountsConfigured,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("network error during {operation}: {source}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("callback server error: {0}")]
    CallbackServer(String),

    #[error("timed out waiting for authorization")]
    Timeout,

    #[error("browser open failed: {0}")]
    BrowserOpen(String),

    #[error(transparent)]
    Storage(#[from] gwc_secrets::SecretsError),
}
