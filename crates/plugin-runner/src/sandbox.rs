use polld_core::config::{SandboxConfig, PROFILE_PLACEHOLDER};
use polld_core::manifest::PluginManifestEntry;
use tokio::process::Command;

use crate::error::PluginRunError;

/// Turns a manifest entry into the command that launches it under its
/// confinement profile.
///
/// Entries with the `unconfined` profile run their executable directly. Every
/// other profile is launched through the configured launcher prefix, with
/// `{profile}` replaced by the profile name:
///
/// ```text
/// aa-exec -p <profile> -- <exec> <args...>
/// ```
#[derive(Debug, Clone)]
pub struct Sandbox {
    launcher: Vec<String>,
}

impl Sandbox {
    pub fn new(launcher: Vec<String>) -> Self {
        Self { launcher }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.launcher.clone())
    }

    /// Build the command for `entry`. The child is killed when the returned
    /// command's child handle is dropped.
    pub fn command(&self, entry: &PluginManifestEntry) -> Result<Command, PluginRunError> {
        let mut cmd = if entry.is_unconfined() {
            Command::new(&entry.exec)
        } else {
            let (program, rest) = self
                .launcher
                .split_first()
                .ok_or_else(|| PluginRunError::NoLauncher(entry.profile.clone()))?;
            let mut cmd = Command::new(program);
            cmd.args(
                rest.iter()
                    .map(|a| a.replace(PROFILE_PLACEHOLDER, &entry.profile)),
            );
            cmd.arg(&entry.exec);
            cmd
        };
        cmd.args(&entry.args);
        cmd.kill_on_drop(true);
        Ok(cmd)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn entry(profile: &str) -> PluginManifestEntry {
        PluginManifestEntry {
            plugin_id: "mail".into(),
            app_id: "com.example.mail_mail".into(),
            exec: PathBuf::from("/usr/lib/plugins/mail"),
            args: vec!["--fast".into()],
            profile: profile.into(),
            needs_authentication_data: true,
        }
    }

    fn argv(cmd: &Command) -> Vec<String> {
        let std = cmd.as_std();
        std::iter::once(std.get_program())
            .chain(std.get_args())
            .map(|a: &OsStr| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn unconfined_runs_exec_directly() {
        let cmd = Sandbox::default().command(&entry("unconfined")).unwrap();
        assert_eq!(argv(&cmd), vec!["/usr/lib/plugins/mail", "--fast"]);
    }

    #[test]
    fn confined_uses_launcher_with_profile() {
        let cmd = Sandbox::default().command(&entry("mail_plugin")).unwrap();
        assert_eq!(
            argv(&cmd),
            vec!["aa-exec", "-p", "mail_plugin", "--", "/usr/lib/plugins/mail", "--fast"]
        );
    }

    #[test]
    fn confined_without_launcher_is_an_error() {
        let err = Sandbox::new(vec![]).command(&entry("mail_plugin")).unwrap_err();
        assert!(matches!(err, PluginRunError::NoLauncher(p) if p == "mail_plugin"));
    }
}
