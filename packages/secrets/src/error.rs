// ABOUTME: Error types for token storage
// ABOUTME: StoreCorrupt is distinct so a bad file is never mistaken for an empty store

use thiserror::Error;

pub type SecretsResult<T> = Result<T, SecretsError>;

#[derive(Error, Debug)]
pub enum SecretsError {
    /// The store exists but cannot be read back. Fatal for the invocation;
    /// callers must not treat this as "no accounts".
    #[error("credential store is corrupt or cannot be decrypted: {0}")]
    StoreCorrupt(String),

    #[error("no token stored for account: {email}")]
    TokenNotFound { email: String },

    /// No password source: no explicit value, no environment variable, and no
    /// interactive terminal to prompt on.
    #[error("keyring password required: set {env} or run interactively", env = crate::password::KEYRING_PASSWORD_ENV)]
    PasswordUnavailable,

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encryption error: {0}")]
    Crypto(String),
}
