// ABOUTME: The TokenStore capability and an in-memory implementation
// ABOUTME: Callers depend on this trait only, never on a concrete backend

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{SecretsError, SecretsResult};
use crate::token::{normalize_email, Token};

/// Durable, keyed secret storage. At most one token per (normalized) email.
///
/// Mutations are serialized in-process by each implementation; concurrent
/// writers from separate processes may race at the storage layer, which is
/// acceptable for a single-user CLI.
pub trait TokenStore: Send + Sync {
    /// Emails with a stored token, in no guaranteed order.
    fn keys(&self) -> SecretsResult<Vec<String>>;

    fn get_token(&self, email: &str) -> SecretsResult<Token>;

    /// Store or update a token. An update without a refresh token keeps the
    /// refresh token already on file for that account.
    fn set_token(&self, email: &str, token: Token) -> SecretsResult<()>;

    /// Idempotent. Deleting the default account also clears the stored
    /// default so no dangling reference remains.
    fn delete_token(&self, email: &str) -> SecretsResult<()>;

    /// All stored tokens, in no guaranteed order; callers sort.
    fn list_tokens(&self) -> SecretsResult<Vec<Token>>;

    /// The explicitly configured default account, if any.
    fn get_default_account(&self) -> SecretsResult<Option<String>>;

    /// Idempotent.
    fn set_default_account(&self, email: &str) -> SecretsResult<()>;
}

/// The persisted shape shared by file-backed stores.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct StoreData {
    pub tokens: BTreeMap<String, Token>,
    pub default_account: Option<String>,
}

impl StoreData {
    pub fn set_token(&mut self, email: &str, token: Token) {
        let key = normalize_email(email);
        let merged = token.merged_into(self.tokens.get(&key));
        self.tokens.insert(key, merged);
    }

    pub fn delete_token(&mut self, email: &str) {
        let key = normalize_email(email);
        self.tokens.remove(&key);
        if self.default_account.as_deref() == Some(key.as_str()) {
            self.default_account = None;
        }
    }
}

/// In-memory token store for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn keys(&self) -> SecretsResult<Vec<String>> {
        let data = self.data.lock().expect("store lock poisoned");
        Ok(data.tokens.keys().cloned().collect())
    }

    fn get_token(&self, email: &str) -> SecretsResult<Token> {
        let key = normalize_email(email);
        let data = self.data.lock().expect("store lock poisoned");
        data.tokens
            .get(&key)
            .cloned()
            .ok_or(SecretsError::TokenNotFound { email: key })
    }

    fn set_token(&self, email: &str, token: Token) -> SecretsResult<()> {
        let mut data = self.data.lock().expect("store lock poisoned");
        data.set_token(email, token);
        Ok(())
    }

    fn delete_token(&self, email: &str) -> SecretsResult<()> {
        let mut data = self.data.lock().expect("store lock poisoned");
        data.delete_token(email);
        Ok(())
    }

    fn list_tokens(&self) -> SecretsResult<Vec<Token>> {
        let data = self.data.lock().expect("store lock poisoned");
        Ok(data.tokens.values().cloned().collect())
    }

    fn get_default_account(&self) -> SecretsResult<Option<String>> {
        let data = self.data.lock().expect("store lock poisoned");
        Ok(data.default_account.clone())
    }

    fn set_default_account(&self, email: &str) -> SecretsResult<()> {
        let mut data = self.data.lock().expect("store lock poisoned");
        data.default_account = Some(normalize_email(email));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(email: &str, refresh: Option<&str>) -> Token {
        Token {
            email: email.to_string(),
            access_token: "at".to_string(),
            refresh_token: refresh.map(String::from),
            expiry: Utc::now() + Duration::hours(1),
            services: vec![],
        }
    }

    #[test]
    fn test_set_and_get_normalizes_email() {
        let store = MemoryStore::new();
        store.set_token("A@B.Com", token("A@B.Com", None)).unwrap();

        assert!(store.get_token("a@b.com").is_ok());
        assert_eq!(store.keys().unwrap(), vec!["a@b.com".to_string()]);
    }

    #[test]
    fn test_get_missing_token_errors() {
        let store = MemoryStore::new();
        let err = store.get_token("nobody@example.com").unwrap_err();
        assert!(matches!(err, SecretsError::TokenNotFound { .. }));
    }

    #[test]
    fn test_update_preserves_refresh_token() {
        let store = MemoryStore::new();
        store
            .set_token("a@b.com", token("a@b.com", Some("refresh-1")))
            .unwrap();
        store.set_token("a@b.com", token("a@b.com", None)).unwrap();

        let stored = store.get_token("a@b.com").unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set_token("a@b.com", token("a@b.com", None)).unwrap();

        store.delete_token("a@b.com").unwrap();
        store.delete_token("a@b.com").unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_delete_default_clears_default() {
        let store = MemoryStore::new();
        store.set_token("a@b.com", token("a@b.com", None)).unwrap();
        store.set_default_account("a@b.com").unwrap();

        store.delete_token("a@b.com").unwrap();
        assert_eq!(store.get_default_account().unwrap(), None);
    }

    #[test]
    fn test_set_default_round_trip() {
        let store = MemoryStore::new();
        store.set_default_account("C@D.com").unwrap();
        assert_eq!(
            store.get_default_account().unwrap().as_deref(),
            Some("c@d.com")
        );
        // Idempotent.
        store.set_default_account("c@d.com").unwrap();
        assert_eq!(
            store.get_default_account().unwrap().as_deref(),
            Some("c@d.com")
        );
    }
}
