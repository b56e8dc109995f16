// ABOUTME: Persisted per-account watch state under ~/.gwc/state/gmail-watch
// ABOUTME: Absence of the state file means NotWatching; presence means a subscription is believed active

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{WatchError, WatchResult};

/// One watch subscription as last observed. The expiration may be stale if
/// the subscription lapsed server-side without a renew; that staleness is
/// surfaced, never masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchState {
    pub email: String,
    pub topic: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub history_id: String,
    pub expiration: DateTime<Utc>,
}

impl WatchState {
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expiration - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

/// Default state directory: `~/.gwc/state/gmail-watch`.
pub fn default_state_dir() -> WatchResult<PathBuf> {
    let home = dirs::home_dir().ok_or(WatchError::StateDirUnavailable)?;
    Ok(home.join(".gwc").join("state").join("gmail-watch"))
}

/// Per-account state file path. Email characters outside a safe filename
/// alphabet are replaced so the address cannot traverse out of the directory.
pub fn state_path(dir: &Path, email: &str) -> PathBuf {
    let safe: String = email
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{}.json", safe))
}

/// Load the state for an account, `None` when no file exists. A file that
/// exists but does not parse is corruption, not NotWatching.
pub fn load(dir: &Path, email: &str) -> WatchResult<Option<WatchState>> {
    let path = state_path(dir, email);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let state = serde_json::from_str(&raw).map_err(|e| WatchError::StateCorrupt {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(Some(state))
}

/// Persist the state, creating the directory as needed. Written via a temp
/// file and rename so a crash never leaves a half-written state file.
pub fn save(dir: &Path, state: &WatchState) -> WatchResult<()> {
    fs::create_dir_all(dir)?;
    let path = state_path(dir, &state.email);
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    fs::rename(&tmp, &path)?;
    debug!(path = %path.display(), "watch state saved");
    Ok(())
}

/// Remove the state file. Missing file is fine.
pub fn remove(dir: &Path, email: &str) -> WatchResult<()> {
    let path = state_path(dir, email);
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "watch state removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
