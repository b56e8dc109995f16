// ABOUTME: Read model over the token store: account listing and default-account resolution
// ABOUTME: Default-first ordering with a read-time fallback that never mutates stored state

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use gwc_secrets::{normalize_email, TokenStore};

use crate::error::{AuthError, AuthResult};

/// Derived, read-only view of one stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub email: String,
    pub services: Vec<String>,
    pub is_default: bool,
}

/// Thin read model over the token store.
#[derive(Clone)]
pub struct AccountRegistry {
    store: Arc<dyn TokenStore>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// All accounts, default first, the rest in lexical email order.
    ///
    /// Exactly one entry of a non-empty listing has `is_default = true`: the
    /// stored default when it names a stored account, otherwise the first
    /// entry. The fallback is applied at read time and never persisted.
    pub fn list(&self) -> AuthResult<Vec<AccountInfo>> {
        let mut tokens = self.store.list_tokens()?;
        tokens.sort_by(|a, b| a.email.cmp(&b.email));

        let stored_default = self.store.get_default_account()?;
        let default_email = stored_default
            .filter(|d| tokens.iter().any(|t| t.email == *d))
            .or_else(|| tokens.first().map(|t| t.email.clone()));

        let mut accounts: Vec<AccountInfo> = tokens
            .into_iter()
            .map(|t| {
                let is_default = default_email.as_deref() == Some(t.email.as_str());
                AccountInfo {
                    email: t.email,
                    services: t.services,
                    is_default,
                }
            })
            .collect();
        // Stable sort keeps the lexical order within the non-default rest.
        accounts.sort_by_key(|a| !a.is_default);
        Ok(accounts)
    }

    /// Resolve an account selector to a stored email.
    ///
    /// An explicit email must exist in the store; an empty selector resolves
    /// to the default account; an empty store is an error.
    pub fn resolve(&self, explicit: Option<&str>) -> AuthResult<String> {
        if let Some(email) = explicit.map(str::trim).filter(|e| !e.is_empty()) {
            let key = normalize_email(email);
            if self.store.keys()?.contains(&key) {
                return Ok(key);
            }
            return Err(AuthError::AccountNotFound { email: key });
        }

        let accounts = self.list()?;
        match accounts.into_iter().find(|a| a.is_default) {
            Some(account) => {
                debug!(email = %account.email, "resolved default account");
                Ok(account.email)
            }
            None => Err(AuthError::NoAccountsConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gwc_secrets::{MemoryStore, Token};

    fn store_with(emails: &[&str]) -> Arc<dyn TokenStore> {
        let store = MemoryStore::new();
        for email in emails {
            store
                .set_token(
                    email,
                    Token {
                        email: email.to_string(),
                        access_token: "at".to_string(),
                        refresh_token: None,
                        expiry: Utc::now() + Duration::hours(1),
                        services: vec!["gmail".to_string()],
                    },
                )
                .unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn test_list_first_account_is_default_when_unset() {
        let registry = AccountRegistry::new(store_with(&["c@d.com", "a@b.com"]));
        let accounts = registry.list().unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].email, "a@b.com");
        assert!(accounts[0].is_default);
        assert!(!accounts[1].is_default);
    }

    #[test]
    fn test_list_explicit_default_sorted_first() {
        let store = store_with(&["a@b.com", "c@d.com"]);
        store.set_default_account("c@d.com").unwrap();
        let registry = AccountRegistry::new(store);

        let accounts = registry.list().unwrap();
        assert_eq!(accounts[0].email, "c@d.com");
        assert!(accounts[0].is_default);
        assert_eq!(accounts[1].email, "a@b.com");
        assert!(!accounts[1].is_default);
    }

    #[test]
    fn test_list_exactly_one_default() {
        let store = store_with(&["a@b.com", "b@b.com", "c@d.com"]);
        store.set_default_account("b@b.com").unwrap();
        let registry = AccountRegistry::new(store);

        let defaults: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .filter(|a| a.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].email, "b@b.com");
    }

    #[test]
    fn test_list_stale_default_falls_back_without_mutating() {
        let store = store_with(&["a@b.com", "c@d.com"]);
        store.set_default_account("gone@x.com").unwrap();
        // Simulate a default pointing at a removed account.
        let registry = AccountRegistry::new(store.clone());

        let accounts = registry.list().unwrap();
        assert!(accounts[0].is_default);
        assert_eq!(accounts[0].email, "a@b.com");
        // Read-time fallback only: stored value untouched.
        assert_eq!(
            store.get_default_account().unwrap().as_deref(),
            Some("gone@x.com")
        );
    }

    #[test]
    fn test_resolve_explicit_must_exist() {
        let registry = AccountRegistry::new(store_with(&["a@b.com"]));

        assert_eq!(registry.resolve(Some("A@B.com")).unwrap(), "a@b.com");
        let err = registry.resolve(Some("x@y.com")).unwrap_err();
        assert!(matches!(err, AuthError::AccountNotFound { .. }));
    }

    #[test]
    fn test_resolve_empty_uses_default() {
        let store = store_with(&["a@b.com", "c@d.com"]);
        store.set_default_account("c@d.com").unwrap();
        let registry = AccountRegistry::new(store);

        assert_eq!(registry.resolve(None).unwrap(), "c@d.com");
        assert_eq!(registry.resolve(Some("  ")).unwrap(), "c@d.com");
    }

    #[test]
    fn test_resolve_empty_store_errors() {
        let registry = AccountRegistry::new(Arc::new(MemoryStore::new()));
        let err = registry.resolve(None).unwrap_err();
        assert!(matches!(err, AuthError::NoAccountsConfigured));
    }
}
