use crate::error::{PolldError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder in `sandbox.launcher` replaced by the plugin's profile name.
pub const PROFILE_PLACEHOLDER: &str = "{profile}";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SandboxConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Command prefix that confines a plugin, e.g. `aa-exec -p {profile} --`.
    /// Plugins with the `unconfined` profile are launched directly.
    #[serde(default = "default_launcher")]
    pub launcher: Vec<String>,
}

fn default_launcher() -> Vec<String> {
    vec![
        "aa-exec".to_string(),
        "-p".to_string(),
        PROFILE_PLACEHOLDER.to_string(),
        "--".to_string(),
    ]
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
        }
    }
}

// ---------------------------------------------------------------------------
// PushConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushConfig {
    /// Log notifications instead of delivering them.
    Log,
    /// Append notifications to a JSON-lines file.
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// POST notifications to a push endpoint.
    Http {
        url: String,
        #[serde(default = "default_push_timeout")]
        timeout_secs: u64,
    },
}

fn default_push_timeout() -> u64 {
    10
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig::Log
    }
}

// ---------------------------------------------------------------------------
// ControlConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7243
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on plugin processes running at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_plugins: usize,
    #[serde(default = "default_plugin_timeout")]
    pub plugin_timeout_secs: u64,
    /// Poll requests accepted while a cycle runs; further requests are rejected.
    #[serde(default = "default_max_queued")]
    pub max_queued_polls: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts_path: Option<PathBuf>,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_plugin_timeout() -> u64 {
    30
}

fn default_max_queued() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_plugins: default_max_concurrent(),
            plugin_timeout_secs: default_plugin_timeout(),
            max_queued_polls: default_max_queued(),
            poll_interval_secs: None,
            manifest_path: None,
            accounts_path: None,
            sandbox: SandboxConfig::default(),
            push: PushConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl Config {
    /// Load the config at `path`. A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Config = serde_yaml::from_str(&text)?;
        // Relative paths are relative to the config file's directory.
        if let Some(dir) = path.parent() {
            config.manifest_path = config.manifest_path.map(|p| paths::resolve(dir, &p));
            config.accounts_path = config.accounts_path.map(|p| paths::resolve(dir, &p));
            if let PushConfig::File { path: Some(p) } = &mut config.push {
                *p = paths::resolve(dir, p);
            }
        }
        Ok(config)
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn manifest_path(&self) -> Result<PathBuf> {
        match &self.manifest_path {
            Some(p) => Ok(p.clone()),
            None => paths::default_manifest_path(),
        }
    }

    pub fn accounts_path(&self) -> Result<PathBuf> {
        match &self.accounts_path {
            Some(p) => Ok(p.clone()),
            None => paths::default_accounts_path(),
        }
    }

    /// Check the config for values that would make the poller misbehave.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_concurrent_plugins == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_concurrent_plugins is 0: no plugin would ever run".into(),
            });
        }

        if self.plugin_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "plugin_timeout_secs is 0: every plugin would time out".into(),
            });
        }

        match self.sandbox.launcher.first() {
            None => warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "sandbox.launcher is empty: confined plugins will fail to launch".into(),
            }),
            Some(bin) => {
                if which::which(bin).is_err() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "sandbox launcher '{bin}' not found on PATH: confined plugins will fail to launch"
                        ),
                    });
                }
                if !self
                    .sandbox
                    .launcher
                    .iter()
                    .any(|a| a.contains(PROFILE_PLACEHOLDER))
                {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "sandbox.launcher has no '{PROFILE_PLACEHOLDER}' placeholder: every plugin gets the same confinement"
                        ),
                    });
                }
            }
        }

        if let PushConfig::Http { url, .. } = &self.push {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("push.url '{url}' is not an http(s) URL"),
                });
            }
        }

        warnings
    }
}

pub fn check_positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(PolldError::Config(format!("{name} must be greater than 0")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_concurrent_plugins, 4);
        assert_eq!(config.plugin_timeout(), Duration::from_secs(30));
        assert_eq!(config.push, PushConfig::Log);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "max_concurrent_plugins: 2\npush:\n  type: file\n  path: pushed.jsonl\nmanifest_path: plugins.json\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_concurrent_plugins, 2);
        assert_eq!(config.plugin_timeout_secs, 30);
        assert_eq!(config.manifest_path.unwrap(), dir.path().join("plugins.json"));
        assert_eq!(
            config.push,
            PushConfig::File {
                path: Some(dir.path().join("pushed.jsonl"))
            }
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_concurrent_plugins: [").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn zero_interval_disables_periodic_polling() {
        let config = Config {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), None);
    }

    #[test]
    fn validate_flags_zero_concurrency_and_timeout() {
        let config = Config {
            max_concurrent_plugins: 0,
            plugin_timeout_secs: 0,
            ..Default::default()
        };
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn validate_flags_launcher_without_placeholder() {
        let config = Config {
            sandbox: SandboxConfig {
                launcher: vec!["sh".into(), "-c".into()],
            },
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|w| w.message.contains(PROFILE_PLACEHOLDER)));
    }

    #[test]
    fn validate_flags_bad_push_url() {
        let config = Config {
            push: PushConfig::Http {
                url: "localhost:9000".into(),
                timeout_secs: 5,
            },
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("push.url")));
    }

    #[test]
    fn check_positive_rejects_zero() {
        assert!(check_positive("max_concurrent_plugins", 0).is_err());
        assert_eq!(check_positive("max_concurrent_plugins", 3).unwrap(), 3);
    }
}
