// ABOUTME: Authorization-code exchange, refresh grant, and userinfo email fetch
// ABOUTME: Exchange failures are surfaced with context and never touch the token store

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use gwc_secrets::{Token, TokenStore};

use crate::error::{AuthError, AuthResult};
use crate::oauth::config::GoogleOAuthConfig;

/// OAuth token response from the provider.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    email: String,
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &Client,
    config: &GoogleOAuthConfig,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> AuthResult<TokenResponse> {
    debug!("exchanging authorization code");
    let response = http
        .post(&config.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ])
        .send()
        .await
        .map_err(|e| AuthError::Network {
            operation: "token exchange".to_string(),
            source: e,
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::TokenExchange(format!(
            "provider returned {}: {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::TokenExchange(format!("invalid token response: {}", e)))
}

/// Redeem a refresh token for a new access token.
pub async fn refresh_access_token(
    http: &Client,
    config: &GoogleOAuthConfig,
    refresh_token: &str,
) -> AuthResult<TokenResponse> {
    debug!("refreshing access token");
    let response = http
        .post(&config.token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ])
        .send()
        .await
        .map_err(|e| AuthError::Network {
            operation: "token refresh".to_string(),
            source: e,
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::RefreshFailed(format!(
            "provider returned {}: {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::RefreshFailed(format!("invalid token response: {}", e)))
}

/// Fetch the authenticated account's email from the userinfo endpoint.
pub async fn fetch_account_email(
    http: &Client,
    config: &GoogleOAuthConfig,
    access_token: &str,
) -> AuthResult<String> {
    let response = http
        .get(&config.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AuthError::Network {
            operation: "userinfo".to_string(),
            source: e,
        })?;

    if !response.status().is_success() {
        return Err(AuthError::TokenExchange(format!(
            "userinfo returned {}",
            response.status()
        )));
    }

    let info: UserInfo = response
        .json()
        .await
        .map_err(|e| AuthError::TokenExchange(format!("invalid userinfo response: {}", e)))?;
    Ok(info.email)
}

/// Build a storable [`Token`] from a provider response.
pub fn token_from_response(
    email: String,
    services: Vec<String>,
    response: TokenResponse,
) -> Token {
    Token {
        email,
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expiry: Utc::now() + Duration::seconds(response.expires_in),
        services,
    }
}

/// Return a usable access token for `email`, refreshing and persisting when
/// the stored one is expired. The stored refresh token is never dropped.
pub async fn ensure_access_token(
    http: &Client,
    config: &GoogleOAuthConfig,
    store: &dyn TokenStore,
    email: &str,
) -> AuthResult<Token> {
    let token = store.get_token(email)?;
    if !token.is_expired() {
        return Ok(token);
    }

    let Some(refresh_token) = token.refresh_token.clone() else {
        return Err(AuthError::RefreshFailed(format!(
            "token for {} expired and no refresh token is stored",
            email
        )));
    };

    let response = refresh_access_token(http, config, &refresh_token).await?;
    let refreshed = token_from_response(token.email.clone(), token.services.clone(), response);
    store.set_token(email, refreshed)?;
    info!(%email, "access token refreshed");
    // set_token merges: a response without a refresh token keeps the stored one.
    store.get_token(email).map_err(Into::into)
}
