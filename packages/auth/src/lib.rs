// ABOUTME: gwc authentication library: account registry and loopback OAuth manager
// ABOUTME: Performs the browser handshake and account administration over a small CSRF-protected API

pub mod error;
pub mod oauth;
pub mod registry;

// Re-export main types
pub use error::{AuthError, AuthResult};
pub use oauth::{
    AuthOutcome, GoogleOAuthConfig, ManageServer, PkceChallenge, TokenResponse,
};
pub use registry::{AccountInfo, AccountRegistry};
