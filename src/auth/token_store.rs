use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mail_triage";

/// Keyring entry names used by the crate.
pub const API_KEY: &str = "api-key";

pub fn imap_password_key(user: &str) -> String {
    format!("imap-password:{user}")
}

pub fn refresh_token_key(user: &str) -> String {
    format!("refresh-token:{user}")
}

/// Save a secret into the OS keyring under `name`
pub fn save_secret(name: &str, value: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, name);
    entry?
        .set_password(value)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load a secret from the keyring; `None` when it was never stored
pub fn load_secret(name: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, name);
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Environment variable first, keyring second.
pub fn lookup_secret(env_var: &str, name: &str) -> Result<Option<String>> {
    if let Ok(v) = std::env::var(env_var)
        && !v.trim().is_empty()
    {
        return Ok(Some(v));
    }
    load_secret(name)
}
