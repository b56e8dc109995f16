// ABOUTME: gwc binary entry point: argument parsing, tracing init, command dispatch
// ABOUTME: All real work lives in the library packages; this layer is glue

use clap::{Parser, Subcommand};
use colored::*;
use std::process;

mod cli;

use cli::accounts::AccountsCommands;
use cli::auth::AuthCommands;
use cli::gmail::GmailCommands;
use cli::utils::GlobalArgs;

#[derive(Parser)]
#[command(name = "gwc")]
#[command(about = "gwc - multi-account Google Workspace CLI")]
#[command(version)]
struct Cli {
    /// Account email to operate on (default account when omitted)
    #[arg(long, global = true, env = "GWC_ACCOUNT")]
    account: Option<String>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Skip confirmation prompts for destructive operations
    #[arg(long, global = true)]
    force: bool,

    /// Never prompt; refuse destructive operations instead
    #[arg(long, global = true)]
    no_input: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage stored credentials
    #[command(subcommand)]
    Auth(AuthCommands),
    /// Account administration server
    #[command(subcommand)]
    Accounts(AccountsCommands),
    /// Gmail operations
    #[command(subcommand)]
    Gmail(GmailCommands),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let globals = GlobalArgs {
        account: args.account,
        json: args.json,
        force: args.force,
        no_input: args.no_input,
    };

    let result = match args.command {
        Commands::Auth(command) => cli::auth::handle_auth_command(command, &globals).await,
        Commands::Accounts(command) => {
            cli::accounts::handle_accounts_command(command, &globals).await
        }
        Commands::Gmail(command) => cli::gmail::handle_gmail_command(command, &globals).await,
    };

    if let Err(e) = result {
        eprintln!("{}", format!("Error: {}", e).red());
        process::exit(1);
    }
}
