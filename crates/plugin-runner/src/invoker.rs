use std::time::Duration;

use async_trait::async_trait;
use polld_core::config::Config;
use polld_core::manifest::PluginManifestEntry;
use polld_core::types::{AccountData, NotificationRecord, PushMessage};
use polld_core::{InvocationError, InvocationResult, Invoker};
use tracing::debug;

use crate::error::PluginRunError;
use crate::process::PluginProcess;
use crate::sandbox::Sandbox;
use crate::types::{PluginLine, PluginRequest, AUTH_REJECTED_EXIT_CODE};

/// Runs plugins as confined subprocesses speaking the JSONL protocol.
#[derive(Debug, Clone, Default)]
pub struct PluginInvoker {
    sandbox: Sandbox,
}

/// What a plugin produced before it exited.
enum Outcome {
    Records(Vec<NotificationRecord>),
    AuthRejected,
}

impl PluginInvoker {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Sandbox::from_config(&config.sandbox))
    }

    async fn run(
        &self,
        data: &AccountData,
        entry: &PluginManifestEntry,
        timeout: Duration,
    ) -> Result<Outcome, InvocationError> {
        let cmd = self.sandbox.command(entry)?;
        let mut process = PluginProcess::spawn(cmd)?;

        let request = PluginRequest {
            account_id: data.account_id,
            service_id: &data.service_id,
            auth: entry.needs_authentication_data.then_some(&data.auth),
        };

        let driven = tokio::time::timeout(timeout, drive(&mut process, &request, entry)).await;
        match driven {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                process.kill().await;
                Err(e)
            }
            Err(_) => {
                process.kill().await;
                Err(InvocationError::Timeout(timeout))
            }
        }
    }
}

/// Feed the request, collect output until EOF and classify the exit status.
async fn drive(
    process: &mut PluginProcess,
    request: &PluginRequest<'_>,
    entry: &PluginManifestEntry,
) -> Result<Outcome, InvocationError> {
    process.send_request(request).await?;

    let mut records = Vec::new();
    let mut auth_rejected = false;
    while let Some((raw, line)) = process.next_line().await? {
        match line {
            PluginLine::Notification {
                app_id,
                message,
                notification,
            } => {
                records.push(to_record(raw, entry, app_id, message, notification)?);
            }
            PluginLine::AuthFailure => auth_rejected = true,
            PluginLine::Unknown => {
                debug!(plugin = %entry.plugin_id, line = %raw, "skipping unknown plugin output");
            }
        }
    }

    let status = process.wait().await?;
    if auth_rejected || status.code() == Some(AUTH_REJECTED_EXIT_CODE) {
        return Ok(Outcome::AuthRejected);
    }
    if !status.success() {
        return Err(InvocationError::Exited {
            code: status.code(),
            stderr: process.stderr(),
        });
    }
    Ok(Outcome::Records(records))
}

fn to_record(
    raw: String,
    entry: &PluginManifestEntry,
    app_id: Option<String>,
    message: Option<serde_json::Value>,
    notification: Option<polld_core::types::Notification>,
) -> Result<NotificationRecord, PluginRunError> {
    if message.is_none() && notification.is_none() {
        return Err(PluginRunError::InvalidNotification {
            line: raw,
            reason: "neither message nor notification present".into(),
        });
    }
    if let Some(vibrate) = notification.as_ref().and_then(|n| n.vibrate.as_ref()) {
        if !vibrate.is_valid() {
            return Err(PluginRunError::InvalidNotification {
                line: raw,
                reason: "vibrate duration cannot be combined with pattern or repeat".into(),
            });
        }
    }
    Ok(NotificationRecord {
        app_id: app_id.unwrap_or_else(|| entry.app_id.clone()),
        payload: PushMessage {
            message,
            notification,
        },
    })
}

#[async_trait]
impl Invoker for PluginInvoker {
    async fn invoke(
        &self,
        data: &AccountData,
        entry: &PluginManifestEntry,
        timeout: Duration,
    ) -> InvocationResult {
        if entry.needs_authentication_data && !data.has_auth() {
            debug!(
                plugin = %data.plugin_id,
                account = data.account_id,
                service = %data.service_id,
                "no stored credentials, not launching plugin"
            );
            return InvocationResult::Error(InvocationError::MissingCredentials);
        }

        debug!(
            plugin = %data.plugin_id,
            account = data.account_id,
            service = %data.service_id,
            profile = %entry.profile,
            "launching plugin"
        );
        match self.run(data, entry, timeout).await {
            Ok(Outcome::Records(records)) => InvocationResult::Success(records),
            Ok(Outcome::AuthRejected) => InvocationResult::AuthFailure(data.clone()),
            Err(e) => InvocationResult::Error(e),
        }
    }
}
