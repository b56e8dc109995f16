// ABOUTME: OS credential-manager token store (Keychain / Credential Manager / Secret Service)
// ABOUTME: One keyring entry per account plus an index entry and a default-account entry

use std::sync::Mutex;

use keyring::Entry;
use tracing::debug;

use crate::error::{SecretsError, SecretsResult};
use crate::store::TokenStore;
use crate::token::{normalize_email, Token};

const KEYRING_SERVICE: &str = "gwc";
const INDEX_USER: &str = "accounts";
const DEFAULT_USER: &str = "default-account";

/// Token store backed by the OS keyring.
///
/// The keyring has no enumeration API, so an index entry tracks the set of
/// account emails; index updates are serialized by an in-process lock.
pub struct KeyringStore {
    service: String,
    lock: Mutex<()>,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE.to_string())
    }

    /// Use a non-default keyring service name (tests use a scratch service).
    pub fn with_service(service: String) -> Self {
        Self {
            service,
            lock: Mutex::new(()),
        }
    }

    fn entry(&self, user: &str) -> SecretsResult<Entry> {
        Ok(Entry::new(&self.service, user)?)
    }

    fn token_entry(&self, email: &str) -> SecretsResult<Entry> {
        self.entry(&format!("token:{}", email))
    }

    fn read_index(&self) -> SecretsResult<Vec<String>> {
        match self.entry(INDEX_USER)?.get_password() {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| SecretsError::StoreCorrupt(format!("invalid account index: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, emails: &[String]) -> SecretsResult<()> {
        self.entry(INDEX_USER)?
            .set_password(&serde_json::to_string(emails)?)?;
        Ok(())
    }
}

impl TokenStore for KeyringStore {
    fn keys(&self) -> SecretsResult<Vec<String>> {
        let _guard = self.lock.lock().expect("store lock poisoned");
        self.read_index()
    }

    fn get_token(&self, email: &str) -> SecretsResult<Token> {
        let key = normalize_email(email);
        match self.token_entry(&key)?.get_password() {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| SecretsError::StoreCorrupt(format!("invalid stored token: {}", e))),
            Err(keyring::Error::NoEntry) => Err(SecretsError::TokenNotFound { email: key }),
            Err(e) => Err(e.into()),
        }
    }

    fn set_token(&self, email: &str, token: Token) -> SecretsResult<()> {
        let key = normalize_email(email);
        let _guard = self.lock.lock().expect("store lock poisoned");

        let existing = match self.token_entry(&key)?.get_password() {
            Ok(raw) => serde_json::from_str::<Token>(&raw).ok(),
            Err(_) => None,
        };
        let merged = token.merged_into(existing.as_ref());

        self.token_entry(&key)?
            .set_password(&serde_json::to_string(&merged)?)?;

        let mut index = self.read_index()?;
        if !index.contains(&key) {
            index.push(key.clone());
            index.sort();
            self.write_index(&index)?;
        }
        debug!(email = %key, "token stored in keyring");
        Ok(())
    }

    fn delete_token(&self, email: &str) -> SecretsResult<()> {
        let key = normalize_email(email);
        let _guard = self.lock.lock().expect("store lock poisoned");

        match self.token_entry(&key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(e.into()),
        }

        let mut index = self.read_index()?;
        index.retain(|e| e != &key);
        self.write_index(&index)?;

        if self.get_default_account()?.as_deref() == Some(key.as_str()) {
            match self.entry(DEFAULT_USER)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn list_tokens(&self) -> SecretsResult<Vec<Token>> {
        let emails = self.keys()?;
        let mut tokens = Vec::with_capacity(emails.len());
        for email in emails {
            // Index entries without a token entry are skipped, not fatal;
            // the index is rebuilt on the next set/delete.
            match self.get_token(&email) {
                Ok(token) => tokens.push(token),
                Err(SecretsError::TokenNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(tokens)
    }

    fn get_default_account(&self) -> SecretsResult<Option<String>> {
        match self.entry(DEFAULT_USER)?.get_password() {
            Ok(email) if email.is_empty() => Ok(None),
            Ok(email) => Ok(Some(email)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_default_account(&self, email: &str) -> SecretsResult<()> {
        self.entry(DEFAULT_USER)?
            .set_password(&normalize_email(email))?;
        Ok(())
    }
}
