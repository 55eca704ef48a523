//! Master password acquisition via TTY prompt or `CREDVAULT_PASSWORD`.

use anyhow::{bail, Context, Result};
use std::io::IsTerminal;
use zeroize::Zeroizing;

/// Environment variable supplying the master password for headless use.
pub const PASSWORD_ENV_VAR: &str = "CREDVAULT_PASSWORD";

fn from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSWORD_ENV_VAR)
        .ok()
        .filter(|password| !password.is_empty())
        .map(Zeroizing::new)
}

fn read(prompt: &str) -> Result<Zeroizing<String>> {
    if !std::io::stdin().is_terminal() {
        bail!("No password provided. Set {PASSWORD_ENV_VAR} or run interactively.");
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Get the master password, from the environment first.
pub fn master_password() -> Result<Zeroizing<String>> {
    match from_env() {
        Some(password) => Ok(password),
        None => read("Master password: "),
    }
}

/// Get a new master password and its confirmation.
///
/// With `allow_env`, the environment value counts as already confirmed.
pub fn new_master_password(allow_env: bool) -> Result<(Zeroizing<String>, Zeroizing<String>)> {
    if let Some(password) = from_env().filter(|_| allow_env) {
        return Ok((password.clone(), password));
    }
    let password = read("New master password: ")?;
    let confirmation = read("Confirm master password: ")?;
    Ok((password, confirmation))
}

/// Prompt for a secret value. Always interactive.
pub fn secret(prompt: &str) -> Result<Zeroizing<String>> {
    let value = rpassword::prompt_password(prompt).context("Failed to read secret")?;
    Ok(Zeroizing::new(value))
}
