// ABOUTME: gmail watch subcommands: start, status, renew, stop, serve
// ABOUTME: Credentials are refreshed before each remote call; status never touches the network

use std::sync::Arc;

use clap::Subcommand;
use colored::*;

use gwc_auth::oauth::ensure_access_token;
use gwc_auth::{AccountRegistry, GoogleOAuthConfig};
use gwc_googleapi::GmailWatchClient;
use gwc_watch::{serve as run_receiver, RenewOutcome, ServeConfig, StopOutcome, WatchLifecycle, WatchStatus};

use super::utils::{confirm_destructive, open_configured_store, GlobalArgs};

#[derive(Subcommand)]
pub enum GmailCommands {
    /// Manage the Gmail push-notification watch
    #[command(subcommand)]
    Watch(WatchCommands),
}

#[derive(Subcommand)]
pub enum WatchCommands {
    /// Register a watch on a Pub/Sub topic
    Start {
        /// Pub/Sub topic (projects/<p>/topics/<t>)
        #[arg(long)]
        topic: String,
        /// Label IDs to restrict notifications to (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,
    },
    /// Report the local watch state
    Status,
    /// Re-register the watch before it expires
    Renew {
        /// Only renew when less than this many hours remain
        #[arg(long)]
        ttl: Option<i64>,
    },
    /// Stop the watch and clear local state
    Stop,
    /// Run the push-notification webhook receiver
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// URL path notifications are POSTed to
        #[arg(long, default_value = "/webhook")]
        path: String,
        /// Shared secret expected in the ?token= query parameter
        #[arg(long)]
        token: Option<String>,
        /// Verify OIDC identity tokens on inbound notifications
        #[arg(long)]
        verify_oidc: bool,
        /// Expected audience for OIDC verification
        #[arg(long)]
        audience: Option<String>,
    },
}

pub async fn handle_gmail_command(
    command: GmailCommands,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        GmailCommands::Watch(command) => handle_watch_command(command, globals).await,
    }
}

async fn handle_watch_command(
    command: WatchCommands,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        WatchCommands::Start { topic, labels } => start(&topic, &labels, globals).await,
        WatchCommands::Status => status(globals).await,
        WatchCommands::Renew { ttl } => renew(ttl, globals).await,
        WatchCommands::Stop => stop(globals).await,
        WatchCommands::Serve {
            bind,
            port,
            path,
            token,
            verify_oidc,
            audience,
        } => {
            let config = ServeConfig {
                bind,
                port,
                path,
                shared_token: token,
                verify_oidc,
                audience,
            };
            run_receiver(config).await?;
            Ok(())
        }
    }
}

/// Build a lifecycle driver with a freshly refreshed access token.
async fn lifecycle(globals: &GlobalArgs) -> Result<WatchLifecycle, Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let registry = AccountRegistry::new(store.clone());
    let email = registry.resolve(globals.account.as_deref())?;

    let config = GoogleOAuthConfig::from_env()?;
    let http = reqwest::Client::new();
    let token = ensure_access_token(&http, &config, store.as_ref(), &email).await?;

    let api = Arc::new(GmailWatchClient::new(token.access_token));
    Ok(WatchLifecycle::new(email, api)?)
}

/// Status needs no credentials: it is a pure local read.
fn local_lifecycle(globals: &GlobalArgs) -> Result<(WatchLifecycle, String), Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let registry = AccountRegistry::new(store);
    let email = registry.resolve(globals.account.as_deref())?;
    let api = Arc::new(NoRemote);
    Ok((WatchLifecycle::new(email.clone(), api)?, email))
}

/// Placeholder API for operations that must never reach the network.
struct NoRemote;

fn no_remote_error(operation: &str) -> gwc_googleapi::ApiError {
    gwc_googleapi::ApiError::InvalidResponse {
        operation: operation.to_string(),
        message: "remote call attempted from a local-only command".to_string(),
    }
}

#[async_trait::async_trait]
impl gwc_googleapi::WatchApi for NoRemote {
    async fn watch(
        &self,
        _topic: &str,
        _label_ids: &[String],
    ) -> gwc_googleapi::ApiResult<gwc_googleapi::WatchRegistration> {
        Err(no_remote_error("watch"))
    }

    async fn stop(&self) -> gwc_googleapi::ApiResult<()> {
        Err(no_remote_error("stop"))
    }
}

async fn start(
    topic: &str,
    labels: &[String],
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let lc = lifecycle(globals).await?;
    let state = lc.start(topic, labels).await?;

    if globals.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!(
            "{}",
            format!(
                "Watching {} until {}",
                state.topic,
                state.expiration.to_rfc3339()
            )
            .green()
        );
    }
    Ok(())
}

async fn status(globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (lc, email) = local_lifecycle(globals)?;
    match lc.status()? {
        WatchStatus::Watching { state, remaining } => {
            if globals.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "watching": true,
                        "state": state,
                        "remaining_seconds": remaining.num_seconds(),
                    })
                );
            } else if remaining > chrono::Duration::zero() {
                println!(
                    "Watching {} ({}h {}m remaining)",
                    state.topic,
                    remaining.num_hours(),
                    remaining.num_minutes() % 60
                );
            } else {
                println!(
                    "{}",
                    format!("Watch on {} expired, renew or restart it", state.topic).yellow()
                );
            }
        }
        WatchStatus::NotWatching => {
            if globals.json {
                println!("{}", serde_json::json!({ "watching": false }));
            } else {
                println!("Not watching ({})", email);
            }
        }
    }
    Ok(())
}

async fn renew(ttl_hours: Option<i64>, globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let lc = lifecycle(globals).await?;
    let threshold = ttl_hours.map(chrono::Duration::hours);

    match lc.renew(threshold).await? {
        RenewOutcome::Renewed(state) => {
            if globals.json {
                println!("{}", serde_json::json!({ "renewed": true, "state": state }));
            } else {
                println!(
                    "{}",
                    format!("Renewed until {}", state.expiration.to_rfc3339()).green()
                );
            }
        }
        RenewOutcome::StillValid(state) => {
            if globals.json {
                println!("{}", serde_json::json!({ "renewed": false, "state": state }));
            } else {
                println!(
                    "Still valid until {}, skipped",
                    state.expiration.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

async fn stop(globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm_destructive("stop the Gmail watch", globals)? {
        println!("Aborted");
        return Ok(());
    }

    let lc = lifecycle(globals).await?;
    match lc.stop().await? {
        StopOutcome::Stopped => {
            if globals.json {
                println!("{}", serde_json::json!({ "stopped": true }));
            } else {
                println!("{}", "Watch stopped".green());
            }
        }
        StopOutcome::WasNotWatching => {
            if globals.json {
                println!("{}", serde_json::json!({ "stopped": false, "was_watching": false }));
            } else {
                println!("No active watch, nothing to stop");
            }
        }
    }
    Ok(())
}
