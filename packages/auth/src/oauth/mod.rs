// ABOUTME: OAuth module: PKCE, Google endpoints, code exchange, and the loopback manage server
// ABOUTME: One authorization attempt per server instance; session state is explicit, never global

pub mod config;
pub mod exchange;
pub mod pages;
pub mod pkce;
pub mod server;

pub use config::GoogleOAuthConfig;
pub use exchange::{ensure_access_token, TokenResponse};
pub use pkce::{generate_pkce_challenge, generate_session_token, PkceChallenge};
pub use server::{AuthOutcome, ManageServer};
