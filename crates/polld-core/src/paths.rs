use crate::error::{PolldError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const APP_DIR: &str = "account-polld";

/// Relative to the XDG data home.
pub const PLUGIN_DATA_FILE: &str = "account-polld/plugins.json";
/// Relative to the XDG config home.
pub const CONFIG_FILE: &str = "account-polld/config.yaml";
/// Relative to the XDG config home.
pub const ACCOUNTS_FILE: &str = "account-polld/accounts.yaml";
/// Relative to the XDG data home.
pub const PUSH_LOG_FILE: &str = "account-polld/pushed.jsonl";

// ---------------------------------------------------------------------------
// XDG base directories
// ---------------------------------------------------------------------------

/// `$XDG_DATA_HOME`, falling back to `~/.local/share`.
pub fn data_home() -> Result<PathBuf> {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"])
}

/// `$XDG_CONFIG_HOME`, falling back to `~/.config`.
pub fn config_home() -> Result<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", &[".config"])
}

fn xdg_dir(var: &str, fallback: &[&str]) -> Result<PathBuf> {
    // The XDG spec says relative values must be ignored.
    if let Some(v) = std::env::var_os(var) {
        let p = PathBuf::from(v);
        if p.is_absolute() {
            return Ok(p);
        }
    }
    let mut home = home::home_dir().ok_or(PolldError::HomeNotFound)?;
    for part in fallback {
        home.push(part);
    }
    Ok(home)
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(data_home()?.join(PLUGIN_DATA_FILE))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_home()?.join(CONFIG_FILE))
}

pub fn default_accounts_path() -> Result<PathBuf> {
    Ok(config_home()?.join(ACCOUNTS_FILE))
}

pub fn default_push_log_path() -> Result<PathBuf> {
    Ok(data_home()?.join(PUSH_LOG_FILE))
}

/// Resolve `path` against `base` when it is relative.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
