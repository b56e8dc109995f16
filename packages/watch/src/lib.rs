// ABOUTME: Gmail push-notification watch lifecycle: per-account subscription state,
// ABOUTME: start/status/renew/stop transitions, and the authenticated webhook receiver

pub mod error;
pub mod lifecycle;
pub mod serve;
pub mod state;
pub mod verify;

pub use error::{WatchError, WatchResult};
pub use lifecycle::{RenewOutcome, StopOutcome, WatchLifecycle, WatchStatus};
pub use serve::{serve, ServeConfig};
pub use state::WatchState;
pub use verify::{NotificationVerifier, VerifyMode};
