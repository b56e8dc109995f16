// ABOUTME: auth subcommands: login via the loopback OAuth server, list, remove, switch
// ABOUTME: Login blocks until the browser handshake terminates or the timeout elapses

use std::time::Duration;

use clap::Subcommand;
use colored::*;

use gwc_auth::{AccountRegistry, AuthOutcome, GoogleOAuthConfig, ManageServer};
use gwc_secrets::normalize_email;

use super::utils::{confirm_destructive, open_configured_store, GlobalArgs};

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Authorize a Google account in the browser
    Login {
        /// Workspace services to request scopes for
        #[arg(long, value_delimiter = ',', default_value = "gmail")]
        services: Vec<String>,
        /// Seconds to wait for the browser handshake
        #[arg(long, default_value = "300")]
        timeout: u64,
    },
    /// List stored accounts
    List,
    /// Remove a stored account
    Remove {
        /// Account email to remove
        email: String,
    },
    /// Make an account the default
    Switch {
        /// Account email to make default
        email: String,
    },
}

pub async fn handle_auth_command(
    command: AuthCommands,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AuthCommands::Login { services, timeout } => login(services, timeout, globals).await,
        AuthCommands::List => list(globals),
        AuthCommands::Remove { email } => remove(&email, globals),
        AuthCommands::Switch { email } => switch(&email, globals),
    }
}

async fn login(
    services: Vec<String>,
    timeout: u64,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let config = GoogleOAuthConfig::from_env()?;
    let server = ManageServer::bind(store, config, services).await?;

    let url = server.authorize_url();
    eprintln!("Opening browser for authorization...");
    eprintln!("If it does not open, visit:\n  {}", url);
    if let Err(e) = server.open_browser() {
        eprintln!("{}", format!("Could not open browser: {}", e).yellow());
    }

    match server.run(Duration::from_secs(timeout)).await? {
        AuthOutcome::Authorized { email } => {
            if globals.json {
                println!("{}", serde_json::json!({ "authorized": email }));
            } else {
                println!("{}", format!("Authorized {}", email).green());
            }
        }
        AuthOutcome::Cancelled => {
            if globals.json {
                println!("{}", serde_json::json!({ "cancelled": true }));
            } else {
                println!("{}", "Authorization cancelled".yellow());
            }
        }
    }
    Ok(())
}

fn list(globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let accounts = AccountRegistry::new(store).list()?;

    if globals.json {
        println!("{}", serde_json::json!({ "accounts": accounts }));
        return Ok(());
    }

    if accounts.is_empty() {
        println!("{}", "No accounts configured".yellow());
        println!("{}", "Use 'gwc auth login' to add one".dimmed());
        return Ok(());
    }
    for account in accounts {
        let marker = if account.is_default { " (default)" } else { "" };
        println!(
            "{}{}  [{}]",
            account.email,
            marker.green(),
            account.services.join(", ")
        );
    }
    Ok(())
}

fn remove(email: &str, globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let email = normalize_email(email);
    if !confirm_destructive(&format!("remove account {}", email), globals)? {
        println!("Aborted");
        return Ok(());
    }

    let store = open_configured_store(globals)?;
    let registry = AccountRegistry::new(store.clone());
    let resolved = registry.resolve(Some(&email))?;
    store.delete_token(&resolved)?;

    if globals.json {
        println!("{}", serde_json::json!({ "removed": resolved }));
    } else {
        println!("{}", format!("Removed {}", resolved).green());
    }
    Ok(())
}

fn switch(email: &str, globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let registry = AccountRegistry::new(store.clone());
    let resolved = registry.resolve(Some(email))?;
    store.set_default_account(&resolved)?;

    if globals.json {
        println!("{}", serde_json::json!({ "default": resolved }));
    } else {
        println!("{}", format!("Default account is now {}", resolved).green());
    }
    Ok(())
}
