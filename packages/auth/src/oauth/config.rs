// ABOUTME: Google OAuth endpoints, client credentials, and per-service scope mapping
// ABOUTME: Endpoint URLs are overridable so tests never contact the real provider

use crate::error::{AuthError, AuthResult};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Environment variables carrying the OAuth client credentials.
pub const CLIENT_ID_ENV: &str = "GWC_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GWC_CLIENT_SECRET";

/// Google OAuth configuration for the authorization-code flow.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleOAuthConfig {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    /// Load client credentials from the environment.
    pub fn from_env() -> AuthResult<Self> {
        let client_id = std::env::var(CLIENT_ID_ENV)
            .map_err(|_| AuthError::Configuration(format!("{} not set", CLIENT_ID_ENV)))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .map_err(|_| AuthError::Configuration(format!("{} not set", CLIENT_SECRET_ENV)))?;
        Ok(Self::new(client_id, client_secret))
    }
}

/// OAuth scopes for the requested Workspace services.
///
/// Unknown service names are rejected so a typo fails before the browser
/// round trip rather than after it.
pub fn scopes_for_services(services: &[String]) -> AuthResult<Vec<String>> {
    let mut scopes = vec!["openid".to_string(), "email".to_string()];
    for service in services {
        let scope = match service.as_str() {
            "gmail" => "https://www.googleapis.com/auth/gmail.modify",
            "drive" => "https://www.googleapis.com/auth/drive",
            "docs" => "https://www.googleapis.com/auth/documents",
            "sheets" => "https://www.googleapis.com/auth/spreadsheets",
            "slides" => "https://www.googleapis.com/auth/presentations",
            "calendar" => "https://www.googleapis.com/auth/calendar",
            "classroom" => "https://www.googleapis.com/auth/classroom.courses",
            other => {
                return Err(AuthError::Configuration(format!(
                    "unknown service: {}",
                    other
                )))
            }
        };
        scopes.push(scope.to_string());
    }
    Ok(scopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_include_identity_scopes() {
        let scopes = scopes_for_services(&["gmail".to_string()]).unwrap();
        assert!(scopes.contains(&"openid".to_string()));
        assert!(scopes.contains(&"email".to_string()));
        assert!(scopes.contains(&"https://www.googleapis.com/auth/gmail.modify".to_string()));
    }

    #[test]
    fn test_unknown_service_rejected() {
        let err = scopes_for_services(&["gmial".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown service"));
    }
}
