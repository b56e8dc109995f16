// ABOUTME: Password-source resolution for the encrypted file store
// ABOUTME: Explicit value > environment variable > TTY prompt; otherwise fail closed

use std::io::{BufRead, IsTerminal, Write};

use tracing::debug;

use crate::error::{SecretsError, SecretsResult};

/// Environment variable consulted for the file-store password.
pub const KEYRING_PASSWORD_ENV: &str = "GWC_KEYRING_PASSWORD";

/// How the file-store password may be obtained.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Explicit password; overrides the environment.
    pub password: Option<String>,
    /// Consult [`KEYRING_PASSWORD_ENV`] when no explicit password is set.
    pub use_env_password: bool,
    /// Prompt on the terminal as a last resort (interactive sessions only).
    pub allow_prompt: bool,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            password: None,
            use_env_password: true,
            allow_prompt: true,
        }
    }
}

/// Resolve the file-store password with strict precedence.
///
/// There is deliberately no fallback to a fixed default or an unencrypted
/// store; with no source available this fails with an error naming
/// [`KEYRING_PASSWORD_ENV`].
pub fn resolve_password(config: &PasswordConfig) -> SecretsResult<String> {
    if let Some(password) = &config.password {
        if !password.is_empty() {
            debug!("using explicit keyring password");
            return Ok(password.clone());
        }
    }

    if config.use_env_password {
        if let Ok(password) = std::env::var(KEYRING_PASSWORD_ENV) {
            if !password.is_empty() {
                debug!(env = KEYRING_PASSWORD_ENV, "using keyring password from environment");
                return Ok(password);
            }
        }
    }

    if config.allow_prompt && std::io::stdin().is_terminal() {
        return prompt_password();
    }

    Err(SecretsError::PasswordUnavailable)
}

fn prompt_password() -> SecretsResult<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "Keyring password: ")?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(SecretsError::PasswordUnavailable);
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_password_wins() {
        let config = PasswordConfig {
            password: Some("pw".to_string()),
            use_env_password: false,
            allow_prompt: false,
        };
        assert_eq!(resolve_password(&config).unwrap(), "pw");
    }

    #[test]
    fn test_env_password_used_when_enabled() {
        std::env::set_var(KEYRING_PASSWORD_ENV, "env-pw");
        let config = PasswordConfig {
            password: None,
            use_env_password: true,
            allow_prompt: false,
        };
        let got = resolve_password(&config);
        std::env::remove_var(KEYRING_PASSWORD_ENV);
        assert_eq!(got.unwrap(), "env-pw");
    }

    #[test]
    fn test_no_source_fails_naming_env_var() {
        let config = PasswordConfig {
            password: None,
            use_env_password: false,
            allow_prompt: false,
        };
        let err = resolve_password(&config).unwrap_err();
        assert!(
            err.to_string().contains(KEYRING_PASSWORD_ENV),
            "error must name the env var, got: {}",
            err
        );
    }

    #[test]
    fn test_empty_explicit_password_is_not_a_source() {
        let config = PasswordConfig {
            password: Some(String::new()),
            use_env_password: false,
            allow_prompt: false,
        };
        assert!(resolve_password(&config).is_err());
    }
}
