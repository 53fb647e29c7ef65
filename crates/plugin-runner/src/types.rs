use polld_core::types::{AuthPayload, Notification};
use serde::{Deserialize, Serialize};

/// Exit status a plugin uses to report that the remote service rejected the
/// account's credentials. Equivalent to an `auth_failure` output line.
pub const AUTH_REJECTED_EXIT_CODE: i32 = 3;

// ─── Input ────────────────────────────────────────────────────────────────

/// The single JSON line written to a plugin's stdin.
///
/// `auth` is only present when the manifest entry asks for authentication
/// data. Credentials travel over stdin and never appear on the command line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRequest<'a> {
    pub account_id: u32,
    pub service_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<&'a AuthPayload>,
}

// ─── Output ───────────────────────────────────────────────────────────────

/// One JSONL line read from a plugin's stdout, discriminated by `"type"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginLine {
    Notification {
        /// Overrides the manifest entry's application id for this record.
        #[serde(default, rename = "appId")]
        app_id: Option<String>,
        #[serde(default)]
        message: Option<serde_json::Value>,
        #[serde(default)]
        notification: Option<Notification>,
    },
    /// The remote service rejected the credentials.
    AuthFailure,
    /// Any type this driver does not know; skipped.
    #[serde(other)]
    Unknown,
}
