// ABOUTME: Shared CLI plumbing: global flags, store opening, destructive-op confirmation
// ABOUTME: The store backend comes from GWC_KEYRING_BACKEND; keyring is the default

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use gwc_secrets::{open_store, PasswordConfig, StoreBackend, StoreConfig, TokenStore};

pub const KEYRING_BACKEND_ENV: &str = "GWC_KEYRING_BACKEND";

pub struct GlobalArgs {
    pub account: Option<String>,
    pub json: bool,
    pub force: bool,
    pub no_input: bool,
}

/// Open the token store selected by `GWC_KEYRING_BACKEND` (default: keyring).
/// `--no-input` disables the interactive password prompt so a file-backend
/// store with no password source fails instead of hanging.
pub fn open_configured_store(globals: &GlobalArgs) -> Result<Arc<dyn TokenStore>, Box<dyn std::error::Error>> {
    let backend = match std::env::var(KEYRING_BACKEND_ENV) {
        Ok(raw) => raw.parse::<StoreBackend>()?,
        Err(_) => StoreBackend::Keyring,
    };
    let config = StoreConfig {
        backend,
        password: PasswordConfig {
            allow_prompt: !globals.no_input,
            ..PasswordConfig::default()
        },
        file_path: None,
    };
    Ok(open_store(&config)?)
}

/// Gate a destructive operation. `--force` always proceeds; `--no-input`
/// without `--force` refuses; otherwise the user is asked on the terminal.
pub fn confirm_destructive(
    action: &str,
    globals: &GlobalArgs,
) -> Result<bool, Box<dyn std::error::Error>> {
    if globals.force {
        return Ok(true);
    }
    if globals.no_input {
        return Err(format!("refusing to {} without --force in --no-input mode", action).into());
    }

    eprint!("{} [y/N]: ", action);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_wins_over_no_input() {
        let globals = GlobalArgs {
            account: None,
            json: false,
            force: true,
            no_input: true,
        };
        assert!(confirm_destructive("remove account", &globals).unwrap());
    }

    #[test]
    fn test_no_input_refuses() {
        let globals = GlobalArgs {
            account: None,
            json: false,
            force: false,
            no_input: true,
        };
        let err = confirm_destructive("remove account", &globals).unwrap_err();
        assert!(err.to_string().contains("refusing"));
    }
}
