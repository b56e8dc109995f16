// ABOUTME: Durable, keyed secret storage for gwc accounts
// ABOUTME: One polymorphic TokenStore capability backed by the OS keyring or an encrypted file

pub mod error;
pub mod file;
pub mod keyring_store;
pub mod password;
pub mod store;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;

// Re-export main types
pub use error::{SecretsError, SecretsResult};
pub use file::EncryptedFileStore;
pub use keyring_store::KeyringStore;
pub use password::{PasswordConfig, KEYRING_PASSWORD_ENV};
pub use store::{MemoryStore, TokenStore};
pub use token::{normalize_email, Token};

/// Which storage strategy backs the token store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// OS credential manager (Keychain, Credential Manager, Secret Service).
    Keyring,
    /// Single encrypted file under `~/.gwc`, key derived from a password.
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyring" => Ok(StoreBackend::Keyring),
            "file" => Ok(StoreBackend::File),
            other => Err(SecretsError::Config(format!(
                "unknown store backend: {} (expected 'keyring' or 'file')",
                other
            ))),
        }
    }
}

/// Token store configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub password: PasswordConfig,
    /// Encrypted-file path override (tests); `None` means `~/.gwc/credentials.enc`.
    pub file_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Keyring,
            password: PasswordConfig::default(),
            file_path: None,
        }
    }
}

/// Open the configured token store.
///
/// The file backend fails closed when no password source is available; it
/// never degrades to an unencrypted store.
pub fn open_store(config: &StoreConfig) -> SecretsResult<Arc<dyn TokenStore>> {
    match config.backend {
        StoreBackend::Keyring => Ok(Arc::new(KeyringStore::new())),
        StoreBackend::File => {
            let password = password::resolve_password(&config.password)?;
            let store = match &config.file_path {
                Some(path) => EncryptedFileStore::open(path.clone(), &password)?,
                None => EncryptedFileStore::open_default(&password)?,
            };
            Ok(Arc::new(store))
        }
    }
}
