// ABOUTME: Error types for the watch lifecycle and webhook receiver
// ABOUTME: NotWatching is a state-machine precondition failure, not a transport error

use std::path::PathBuf;

use thiserror::Error;

pub type WatchResult<T> = Result<T, WatchError>;

#[derive(Error, Debug)]
pub enum WatchError {
    /// The account has no active watch subscription locally.
    #[error("no active watch for {email}: run watch start first")]
    NotWatching { email: String },

    /// Receiver configuration rejected before any socket is opened.
    #[error("{0}")]
    InvalidConfig(String),

    /// The persisted state file exists but cannot be parsed.
    #[error("watch state corrupt at {}: {reason}", path.display())]
    StateCorrupt { path: PathBuf, reason: String },

    #[error("watch state directory unavailable")]
    StateDirUnavailable,

    /// Inbound notification failed authentication.
    #[error("notification rejected: {0}")]
    Unverified(String),

    #[error("watch API error: {0}")]
    Api(#[from] gwc_googleapi::ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    pub fn is_not_watching(&self) -> bool {
        matches!(self, WatchError::NotWatching { .. })
    }
}
