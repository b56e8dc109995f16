// ABOUTME: The stored credential for one account
// ABOUTME: Keyed by case-normalized email; a stored refresh token survives partial updates

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored OAuth credential for a single account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    /// Services this credential was authorized for (gmail, drive, ...).
    #[serde(default)]
    pub services: Vec<String>,
}

/// Case-normalize an account email for use as a store key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Token {
    /// Whether the access token is expired (with a 5 minute buffer).
    pub fn is_expired(&self) -> bool {
        self.expiry < Utc::now() + Duration::minutes(5)
    }

    /// Merge an update into an existing stored token.
    ///
    /// Google only returns a refresh token on the first consent; an update
    /// without one must keep the refresh token already on file.
    pub fn merged_into(mut self, existing: Option<&Token>) -> Token {
        if self.refresh_token.is_none() {
            if let Some(existing) = existing {
                self.refresh_token = existing.refresh_token.clone();
            }
        }
        self
    }
}
