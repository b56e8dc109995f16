// ABOUTME: Loopback OAuth manage server: authorization callback plus account administration
// ABOUTME: One CSRF token and one OAuth state per server instance; session state is never global

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use gwc_secrets::{normalize_email, TokenStore};

use crate::error::{AuthError, AuthResult};
use crate::oauth::config::GoogleOAuthConfig;
use crate::oauth::exchange::{exchange_code, fetch_account_email, token_from_response};
use crate::oauth::pages;
use crate::oauth::pkce::{generate_pkce_challenge, generate_session_token, PkceChallenge};
use crate::registry::AccountRegistry;

/// CSRF token header required on state-mutating admin endpoints.
pub const CSRF_TOKEN_HEADER: &str = "X-CSRF-Token";

/// Terminal outcome of an authorization attempt.
///
/// Cancellation is the user's action, not a fault, and is reported distinctly
/// from failure.
#[derive(Debug, PartialEq)]
pub enum AuthOutcome {
    Authorized { email: String },
    Cancelled,
}

/// Per-invocation session state shared by all handlers.
struct Session {
    csrf_token: String,
    oauth_state: String,
    redirect_uri: String,
    services: Vec<String>,
    scopes: Vec<String>,
    store: Arc<dyn TokenStore>,
    registry: AccountRegistry,
    config: GoogleOAuthConfig,
    pkce: PkceChallenge,
    http: reqwest::Client,
    // Consumed by the first terminal callback; later callbacks cannot
    // re-terminate the flow.
    outcome_tx: Mutex<Option<oneshot::Sender<AuthResult<AuthOutcome>>>>,
}

impl Session {
    fn send_outcome(&self, outcome: AuthResult<AuthOutcome>) {
        let tx = self.outcome_tx.lock().expect("session lock poisoned").take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
    }

    fn csrf_matches(&self, headers: &HeaderMap) -> bool {
        let Some(provided) = headers.get(CSRF_TOKEN_HEADER).and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        provided.as_bytes().ct_eq(self.csrf_token.as_bytes()).into()
    }

    async fn complete_exchange(&self, code: &str) -> AuthResult<String> {
        let response = exchange_code(
            &self.http,
            &self.config,
            code,
            &self.pkce.code_verifier,
            &self.redirect_uri,
        )
        .await?;

        let email = normalize_email(
            &fetch_account_email(&self.http, &self.config, &response.access_token).await?,
        );

        // Single store call: the write is all-or-nothing, an exchange that
        // failed earlier never leaves a partial token behind.
        let token = token_from_response(email.clone(), self.services.clone(), response);
        self.store.set_token(&email, token)?;
        Ok(email)
    }
}

/// Loopback OAuth authorization and account-administration server.
///
/// Single-session, single-use: the server carries exactly one CSRF token and
/// one OAuth state for its lifetime and handles one authorization attempt. It
/// does not survive process restarts, and a second concurrent authorization
/// attempt racing the first is unsupported.
pub struct ManageServer {
    session: Arc<Session>,
    listener: tokio::net::TcpListener,
    outcome_rx: oneshot::Receiver<AuthResult<AuthOutcome>>,
}

impl ManageServer {
    /// Bind an ephemeral loopback listener and prepare a session.
    pub async fn bind(
        store: Arc<dyn TokenStore>,
        config: GoogleOAuthConfig,
        services: Vec<String>,
    ) -> AuthResult<Self> {
        let scopes = crate::oauth::config::scopes_for_services(&services)?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AuthError::CallbackServer(format!("failed to bind loopback: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(format!("no local address: {}", e)))?;
        let redirect_uri = format!("http://127.0.0.1:{}/oauth2/callback", addr.port());
        info!(%redirect_uri, "manage server bound");

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let session = Arc::new(Session {
            csrf_token: generate_session_token(32),
            oauth_state: generate_session_token(32),
            redirect_uri,
            registry: AccountRegistry::new(store.clone()),
            services,
            scopes,
            store,
            config,
            pkce: generate_pkce_challenge(),
            http: reqwest::Client::new(),
            outcome_tx: Mutex::new(Some(outcome_tx)),
        });

        Ok(Self {
            session,
            listener,
            outcome_rx,
        })
    }

    /// The URL served at `GET /` (accounts administration page).
    pub fn base_url(&self) -> String {
        self.session
            .redirect_uri
            .trim_end_matches("/oauth2/callback")
            .to_string()
    }

    /// The provider authorization URL for this session.
    pub fn authorize_url(&self) -> String {
        let mut url = url::Url::parse(&self.session.config.auth_url)
            .expect("auth URL validated at configuration time");
        url.query_pairs_mut()
            .append_pair("client_id", &self.session.config.client_id)
            .append_pair("redirect_uri", &self.session.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.session.scopes.join(" "))
            .append_pair("state", &self.session.oauth_state)
            .append_pair("code_challenge", &self.session.pkce.code_challenge)
            .append_pair("code_challenge_method", &self.session.pkce.code_challenge_method)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        url.to_string()
    }

    /// Open the system browser on the authorization URL.
    pub fn open_browser(&self) -> AuthResult<()> {
        let url = self.authorize_url();
        open::that(&url).map_err(|e| AuthError::BrowserOpen(e.to_string()))
    }

    /// Serve until a terminal callback event, the timeout, or Ctrl-C,
    /// whichever comes first. The listener is closed on the way out either way.
    pub async fn run(self, timeout: Duration) -> AuthResult<AuthOutcome> {
        self.run_with_interrupt(timeout, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("manage server shutting down");
        })
        .await
    }

    /// `run` with the interrupt signal supplied by the caller.
    pub async fn run_with_interrupt(
        self,
        timeout: Duration,
        interrupt: impl Future<Output = ()>,
    ) -> AuthResult<AuthOutcome> {
        let router = Self::router(self.session.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let result = axum::serve(self.listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("manage server error: {}", e);
            }
        });

        tokio::pin!(interrupt);
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, self.outcome_rx) => match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(AuthError::CallbackServer(
                    "server closed before a terminal event".to_string(),
                )),
                Err(_) => Err(AuthError::Timeout),
            },
            _ = &mut interrupt => Err(AuthError::CallbackServer(
                "interrupted before a terminal event".to_string(),
            )),
        };

        let _ = shutdown_tx.send(());
        let _ = server.await;
        outcome
    }

    fn router(session: Arc<Session>) -> Router {
        Router::new()
            .route("/", get(handle_accounts_page))
            .route("/accounts", get(handle_list_accounts))
            .route("/oauth2/callback", get(handle_oauth_callback))
            .route("/set-default", post(handle_set_default))
            .route("/remove-account", post(handle_remove_account))
            .with_state(session)
    }
}

async fn handle_accounts_page(State(session): State<Arc<Session>>) -> Html<String> {
    Html(pages::accounts_page(&session.csrf_token))
}

async fn handle_list_accounts(State(session): State<Arc<Session>>) -> Response {
    match session.registry.list() {
        Ok(accounts) => Json(json!({ "accounts": accounts })).into_response(),
        Err(e) => {
            error!("failed to list accounts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_oauth_callback(
    State(session): State<Arc<Session>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // The user declining consent is a normal terminal outcome, not a fault.
    if let Some(reason) = params.get("error") {
        info!(%reason, "authorization cancelled by user");
        session.send_outcome(Ok(AuthOutcome::Cancelled));
        return Html(pages::cancelled_page()).into_response();
    }

    match params.get("state") {
        Some(state) if state == &session.oauth_state => {}
        _ => {
            warn!("oauth callback state mismatch");
            return (StatusCode::BAD_REQUEST, AuthError::StateMismatch.to_string())
                .into_response();
        }
    }

    let code = match params.get("code").map(String::as_str) {
        Some(code) if !code.is_empty() => code,
        _ => {
            warn!("oauth callback missing code");
            return (StatusCode::BAD_REQUEST, AuthError::MissingCode.to_string())
                .into_response();
        }
    };

    match session.complete_exchange(code).await {
        Ok(email) => {
            info!(%email, "authorization complete");
            let page = pages::success_page(&email);
            session.send_outcome(Ok(AuthOutcome::Authorized { email }));
            Html(page).into_response()
        }
        Err(e) => {
            error!("token exchange failed: {}", e);
            session.send_outcome(Err(e));
            (StatusCode::BAD_GATEWAY, Html(pages::exchange_failed_page())).into_response()
        }
    }
}

#[derive(Deserialize)]
struct EmailBody {
    email: String,
}

async fn handle_set_default(
    State(session): State<Arc<Session>>,
    headers: HeaderMap,
    Json(body): Json<EmailBody>,
) -> Response {
    // CSRF is checked before any store access.
    if !session.csrf_matches(&headers) {
        warn!("set-default rejected: invalid CSRF token");
        return (StatusCode::FORBIDDEN, AuthError::CsrfRejected.to_string()).into_response();
    }

    let email = normalize_email(&body.email);
    match account_exists(session.store.as_ref(), &email) {
        Ok(true) => {}
        Ok(false) => {
            let err = AuthError::AccountNotFound { email };
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
        Err(response) => return response,
    }

    match session.store.set_default_account(&email) {
        Ok(()) => Json(json!({ "ok": true, "default": email })).into_response(),
        Err(e) => {
            error!("set-default failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_remove_account(
    State(session): State<Arc<Session>>,
    headers: HeaderMap,
    Json(body): Json<EmailBody>,
) -> Response {
    if !session.csrf_matches(&headers) {
        warn!("remove-account rejected: invalid CSRF token");
        return (StatusCode::FORBIDDEN, AuthError::CsrfRejected.to_string()).into_response();
    }

    let email = normalize_email(&body.email);
    match account_exists(session.store.as_ref(), &email) {
        Ok(true) => {}
        Ok(false) => {
            let err = AuthError::AccountNotFound { email };
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
        Err(response) => return response,
    }

    match session.store.delete_token(&email) {
        Ok(()) => {
            info!(%email, "account removed");
            Json(json!({ "ok": true, "removed": email })).into_response()
        }
        Err(e) => {
            error!("remove-account failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn account_exists(store: &dyn TokenStore, email: &str) -> Result<bool, Response> {
    match store.keys() {
        Ok(keys) => Ok(keys.iter().any(|k| k == email)),
        Err(e) => {
            error!("failed to read store: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response())
        }
    }
}
