// ABOUTME: Google API plumbing for gwc: error taxonomy, retry policy, Gmail watch client
// ABOUTME: Downstream REST services consume the access token; this crate owns the failure modes

pub mod error;
pub mod gmail;
pub mod retry;

// Re-export main types
pub use error::{ApiError, ApiResult};
pub use gmail::{GmailWatchClient, WatchApi, WatchRegistration};
pub use retry::{CircuitBreaker, RetryPolicy};
