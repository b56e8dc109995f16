// ABOUTME: Inbound push-notification authentication: shared token or OIDC identity token
// ABOUTME: Shared-token comparison is constant time; OIDC goes through Google's tokeninfo endpoint

use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{WatchError, WatchResult};

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// How inbound notifications are authenticated.
#[derive(Debug, Clone)]
pub enum VerifyMode {
    /// No authentication. Only acceptable on a loopback bind.
    None,
    /// Pub/Sub push `?token=` query parameter compared against a shared secret.
    SharedToken(String),
    /// OIDC identity token in the Authorization header, verified remotely.
    Oidc { audience: Option<String> },
}

#[derive(Deserialize)]
struct TokenInfo {
    iss: String,
    aud: String,
    #[serde(deserialize_with = "string_as_i64")]
    exp: i64,
}

// tokeninfo returns numeric fields as JSON strings.
fn string_as_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

pub struct NotificationVerifier {
    mode: VerifyMode,
    http: reqwest::Client,
    tokeninfo_url: String,
}

impl NotificationVerifier {
    pub fn new(mode: VerifyMode) -> Self {
        Self {
            mode,
            http: reqwest::Client::new(),
            tokeninfo_url: GOOGLE_TOKENINFO_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_tokeninfo_url(mode: VerifyMode, url: String) -> Self {
        Self {
            mode,
            http: reqwest::Client::new(),
            tokeninfo_url: url,
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self.mode, VerifyMode::None)
    }

    /// Verify one inbound request given its bearer token (if any) and the
    /// `token` query parameter (if any).
    pub async fn verify(
        &self,
        bearer: Option<&str>,
        query_token: Option<&str>,
    ) -> WatchResult<()> {
        match &self.mode {
            VerifyMode::None => Ok(()),
            VerifyMode::SharedToken(expected) => {
                let provided = query_token
                    .ok_or_else(|| WatchError::Unverified("missing token".to_string()))?;
                let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
                if matches {
                    Ok(())
                } else {
                    Err(WatchError::Unverified("token mismatch".to_string()))
                }
            }
            VerifyMode::Oidc { audience } => {
                let token = bearer.ok_or_else(|| {
                    WatchError::Unverified("missing bearer token".to_string())
                })?;
                self.verify_oidc(token, audience.as_deref()).await
            }
        }
    }

    async fn verify_oidc(&self, token: &str, audience: Option<&str>) -> WatchResult<()> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| WatchError::Unverified(format!("tokeninfo unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(WatchError::Unverified(format!(
                "tokeninfo rejected token: {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| WatchError::Unverified(format!("invalid tokeninfo response: {}", e)))?;

        if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
            return Err(WatchError::Unverified(format!(
                "unexpected issuer: {}",
                info.iss
            )));
        }
        if info.exp <= chrono::Utc::now().timestamp() {
            return Err(WatchError::Unverified("identity token expired".to_string()));
        }
        if let Some(audience) = audience {
            if info.aud != audience {
                return Err(WatchError::Unverified(format!(
                    "audience mismatch: {}",
                    info.aud
                )));
            }
        }

        debug!(issuer = %info.iss, "identity token verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_mode_accepts_anything() {
        let verifier = NotificationVerifier::new(VerifyMode::None);
        assert!(!verifier.requires_auth());
        verifier.verify(None, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_token_match() {
        let verifier = NotificationVerifier::new(VerifyMode::SharedToken("s3cret".to_string()));
        assert!(verifier.requires_auth());
        verifier.verify(None, Some("s3cret")).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_token_mismatch_and_missing() {
        let verifier = NotificationVerifier::new(VerifyMode::SharedToken("s3cret".to_string()));

        let err = verifier.verify(None, Some("wrong")).await.unwrap_err();
        assert!(matches!(err, WatchError::Unverified(_)));

        let err = verifier.verify(None, None).await.unwrap_err();
        assert!(matches!(err, WatchError::Unverified(_)));
    }

    #[tokio::test]
    async fn test_oidc_missing_bearer_rejected_without_network() {
        // Unroutable tokeninfo URL proves no request is made for a missing token.
        let verifier = NotificationVerifier::with_tokeninfo_url(
            VerifyMode::Oidc { audience: None },
            "http://127.0.0.1:1/tokeninfo".to_string(),
        );
        let err = verifier.verify(None, None).await.unwrap_err();
        assert!(matches!(err, WatchError::Unverified(_)));
    }
}
