use async_trait::async_trait;
use std::time::Duration;

use crate::error::InvocationError;
use crate::manifest::PluginManifestEntry;
use crate::types::{AccountData, NotificationRecord};

/// Terminal outcome of one plugin invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    /// The plugin ran. An empty list means nothing new.
    Success(Vec<NotificationRecord>),
    /// The remote service rejected the account's credentials.
    AuthFailure(AccountData),
    Error(InvocationError),
}

impl InvocationResult {
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationResult::Success(_) => "success",
            InvocationResult::AuthFailure(_) => "auth_failure",
            InvocationResult::Error(_) => "error",
        }
    }
}

/// Runs one plugin for one work item.
///
/// Implementations must always return a terminal result; errors are values,
/// not panics. Invocations are independent of each other.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        data: &AccountData,
        entry: &PluginManifestEntry,
        timeout: Duration,
    ) -> InvocationResult;
}
