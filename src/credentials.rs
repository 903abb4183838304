//! Credential storage: OS keychain on macOS, a 0600 file elsewhere.
//!
//! On macOS the token lives in the system keychain under service
//! `<app-name>` / account `api-token`. Elsewhere it's a 0600-mode file at
//! the OS-conventional config directory under `<app-name>/token`.
//! `TODOIST_API_TOKEN` always wins when set, bypassing both.

use crate::config::get_config_dir;
use crate::error::CredentialError;
use std::fs;
use std::io::Write;

const SERVICE: &str = "localsync";
const ACCOUNT: &str = "api-token";
const ENV_VAR: &str = "TODOIST_API_TOKEN";
const TOKEN_FILE: &str = "token";

/// Load the API token: env override, then the platform credential store.
pub fn load_token() -> Result<String, CredentialError> {
    if let Ok(token) = std::env::var(ENV_VAR) {
        if !token.is_empty() {
            log::info!("Using API token from {ENV_VAR}");
            return Ok(token);
        }
    }

    load_stored_token()
}

/// Save a token to the platform credential store (the `--setup` flow).
pub fn store_token(token: &str) -> Result<(), CredentialError> {
    #[cfg(target_os = "macos")]
    {
        let entry = keyring::Entry::new(SERVICE, ACCOUNT)?;
        entry.set_password(token)?;
        log::info!("Saved API token to the macOS keychain");
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    {
        let path = token_file_path();
        let mut file = fs::File::create(&path)?;
        file.write_all(token.as_bytes())?;
        restrict_file_permissions(&path)?;
        log::info!("Saved API token to {:?}", path);
        Ok(())
    }
}

fn load_stored_token() -> Result<String, CredentialError> {
    #[cfg(target_os = "macos")]
    {
        let entry = keyring::Entry::new(SERVICE, ACCOUNT)?;
        match entry.get_password() {
            Ok(token) => Ok(token),
            Err(keyring::Error::NoEntry) => Err(CredentialError::Missing),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(target_os = "macos"))]
    {
        let path = token_file_path();
        if !path.exists() {
            return Err(CredentialError::Missing);
        }
        let content = fs::read_to_string(&path)?;
        let token = content.trim().to_string();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }
        Ok(token)
    }
}

fn token_file_path() -> std::path::PathBuf {
    get_config_dir().join(TOKEN_FILE)
}

#[cfg(unix)]
fn restrict_file_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

/// Whether a credential is already configured (env var or stored).
pub fn is_configured() -> bool {
    load_token().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var(ENV_VAR, "env-token-123");
        assert_eq!(load_token().unwrap(), "env-token-123");
        std::env::remove_var(ENV_VAR);
    }
}
