use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolldError {
    #[error("failed to load plugin manifest {path}: {reason}")]
    ManifestLoad { path: String, reason: String },

    #[error("failed to enumerate services for account {account_id}: {reason}")]
    AccountEnumeration { account_id: u32, reason: String },

    #[error("account not found: {0}")]
    AccountNotFound(u32),

    #[error("push delivery to '{app_id}' failed: {reason}")]
    PushDelivery { app_id: String, reason: String },

    #[error("a poll cycle is already in progress and the queue is full")]
    OverlappingPollRequest,

    #[error("poller is not running")]
    PollerStopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PolldError>;

/// Why a single plugin invocation did not produce notifications.
///
/// Every variant is local to one invocation: it is logged by the poller and
/// never affects sibling invocations in the same cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("plugin requires authentication data but none is stored")]
    MissingCredentials,

    #[error("plugin did not finish within {0:?}")]
    Timeout(Duration),

    #[error("malformed plugin output: {reason}\n  line: {line}")]
    MalformedOutput { line: String, reason: String },

    #[error("failed to launch plugin: {0}")]
    Spawn(String),

    #[error("plugin exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Exited { code: Option<i32>, stderr: String },

    #[error("plugin I/O error: {0}")]
    Io(String),

    #[error("invocation aborted: {0}")]
    Aborted(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exited_message_includes_code_and_stderr() {
        let err = InvocationError::Exited {
            code: Some(2),
            stderr: "network unreachable".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code 2"), "got: {msg}");
        assert!(msg.contains("network unreachable"), "got: {msg}");
    }

    #[test]
    fn exited_by_signal_has_no_stderr_suffix() {
        let err = InvocationError::Exited {
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "plugin exited with a signal");
    }
}
