// ABOUTME: Watch lifecycle state machine: NotWatching -> Watching -> NotWatching
// ABOUTME: The provider model is re-registration; renew re-invokes watch rather than extending

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use gwc_googleapi::{WatchApi, WatchRegistration};

use crate::error::{WatchError, WatchResult};
use crate::state::{self, WatchState};

/// Result of a `status` read. Never touches the remote API.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchStatus {
    Watching {
        state: WatchState,
        remaining: chrono::Duration,
    },
    NotWatching,
}

/// Result of a `stop`. A no-op stop is reported distinctly, not as an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopOutcome {
    Stopped,
    WasNotWatching,
}

/// Result of a `renew` with a minimum-remaining threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum RenewOutcome {
    Renewed(WatchState),
    StillValid(WatchState),
}

/// Per-account lifecycle driver over an opaque watch API.
pub struct WatchLifecycle {
    email: String,
    state_dir: PathBuf,
    api: Arc<dyn WatchApi>,
}

impl WatchLifecycle {
    pub fn new(email: String, api: Arc<dyn WatchApi>) -> WatchResult<Self> {
        Ok(Self {
            email,
            state_dir: state::default_state_dir()?,
            api,
        })
    }

    pub fn with_state_dir(email: String, state_dir: PathBuf, api: Arc<dyn WatchApi>) -> Self {
        Self {
            email,
            state_dir,
            api,
        }
    }

    /// Register a watch and persist the resulting state. Idempotent: when a
    /// subscription already exists locally, it is re-registered and the state
    /// overwritten rather than rejected.
    pub async fn start(&self, topic: &str, label_ids: &[String]) -> WatchResult<WatchState> {
        if let Some(existing) = state::load(&self.state_dir, &self.email)? {
            info!(
                email = %self.email,
                topic = %existing.topic,
                "watch already active, re-registering"
            );
        }

        let registration = self.api.watch(topic, label_ids).await?;
        let state = self.state_from_registration(topic, label_ids, registration)?;
        state::save(&self.state_dir, &state)?;
        info!(email = %self.email, history_id = %state.history_id, "watch started");
        Ok(state)
    }

    /// Pure local read. Reports remaining time to expiry, which may be
    /// negative when the subscription lapsed without a renew.
    pub fn status(&self) -> WatchResult<WatchStatus> {
        match state::load(&self.state_dir, &self.email)? {
            Some(state) => {
                let remaining = state.remaining(Utc::now());
                Ok(WatchStatus::Watching { state, remaining })
            }
            None => Ok(WatchStatus::NotWatching),
        }
    }

    /// Re-register the existing subscription. Requires Watching. When
    /// `min_remaining` is given and the subscription still has at least that
    /// long to live, the remote call is skipped.
    ///
    /// A remote "no such subscription" means the server-side watch is gone:
    /// local state is removed and the caller must `start` again.
    pub async fn renew(
        &self,
        min_remaining: Option<chrono::Duration>,
    ) -> WatchResult<RenewOutcome> {
        let current = state::load(&self.state_dir, &self.email)?.ok_or_else(|| {
            WatchError::NotWatching {
                email: self.email.clone(),
            }
        })?;

        if let Some(threshold) = min_remaining {
            let remaining = current.remaining(Utc::now());
            if remaining > threshold {
                info!(email = %self.email, remaining_secs = remaining.num_seconds(), "watch still valid, skipping renew");
                return Ok(RenewOutcome::StillValid(current));
            }
        }

        let registration = match self.api.watch(&current.topic, &current.label_ids).await {
            Ok(registration) => registration,
            Err(e) if e.is_not_found() => {
                warn!(email = %self.email, "subscription gone server-side, clearing local state");
                state::remove(&self.state_dir, &self.email)?;
                return Err(WatchError::NotWatching {
                    email: self.email.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let state =
            self.state_from_registration(&current.topic, &current.label_ids, registration)?;
        state::save(&self.state_dir, &state)?;
        info!(email = %self.email, history_id = %state.history_id, "watch renewed");
        Ok(RenewOutcome::Renewed(state))
    }

    /// Stop the subscription. Local state is removed unconditionally once the
    /// user asked to stop, even when the remote call fails partway.
    pub async fn stop(&self) -> WatchResult<StopOutcome> {
        if state::load(&self.state_dir, &self.email)?.is_none() {
            return Ok(StopOutcome::WasNotWatching);
        }

        let remote = self.api.stop().await;
        state::remove(&self.state_dir, &self.email)?;

        match remote {
            Ok(()) => {
                info!(email = %self.email, "watch stopped");
                Ok(StopOutcome::Stopped)
            }
            Err(e) if e.is_not_found() => {
                warn!(email = %self.email, "subscription already gone server-side");
                Ok(StopOutcome::Stopped)
            }
            Err(e) => {
                warn!(email = %self.email, "remote stop failed, local state cleared anyway");
                Err(e.into())
            }
        }
    }

    fn state_from_registration(
        &self,
        topic: &str,
        label_ids: &[String],
        registration: WatchRegistration,
    ) -> WatchResult<WatchState> {
        Ok(WatchState {
            email: self.email.clone(),
            topic: topic.to_string(),
            label_ids: label_ids.to_vec(),
            history_id: registration.history_id,
            expiration: expiration_from_ms(registration.expiration_ms),
        })
    }
}

fn expiration_from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
}
