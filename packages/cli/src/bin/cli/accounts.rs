// ABOUTME: accounts serve: run the loopback administration server without starting a login
// ABOUTME: Useful for switching defaults or removing accounts from the browser page

use std::time::Duration;

use clap::Subcommand;
use colored::*;

use gwc_auth::{AuthError, GoogleOAuthConfig, ManageServer};

use super::utils::{open_configured_store, GlobalArgs};

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Serve the account administration page on a loopback port
    Serve {
        /// Seconds to keep the server running
        #[arg(long, default_value = "600")]
        timeout: u64,
    },
}

pub async fn handle_accounts_command(
    command: AccountsCommands,
    globals: &GlobalArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AccountsCommands::Serve { timeout } => serve(timeout, globals).await,
    }
}

async fn serve(timeout: u64, globals: &GlobalArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_configured_store(globals)?;
    let config = GoogleOAuthConfig::from_env()?;
    let server = ManageServer::bind(store, config, vec![]).await?;

    println!("Account administration at {}", server.base_url().green());
    println!("{}", "Press Ctrl-C or wait for the timeout to stop".dimmed());

    // No login is in flight, so the expected terminal event is the timeout.
    match server.run(Duration::from_secs(timeout)).await {
        Ok(_) | Err(AuthError::Timeout) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
