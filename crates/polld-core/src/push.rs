//! Push sinks: where finished notifications go.
//!
//! Delivery is best effort. A failed post is reported to the caller, which
//! logs it; nothing is retried within a poll cycle.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::error::{PolldError, Result};
use crate::io;
use crate::types::NotificationRecord;

#[async_trait]
pub trait PushSink: Send + Sync {
    async fn post(&self, record: &NotificationRecord) -> Result<()>;
}

fn delivery_error(record: &NotificationRecord, reason: impl ToString) -> PolldError {
    PolldError::PushDelivery {
        app_id: record.app_id.clone(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// LogPushSink
// ---------------------------------------------------------------------------

/// Logs every notification at INFO. Useful when no push service is available.
pub struct LogPushSink;

#[async_trait]
impl PushSink for LogPushSink {
    async fn post(&self, record: &NotificationRecord) -> Result<()> {
        let summary = record
            .payload
            .notification
            .as_ref()
            .and_then(|n| n.card.as_ref())
            .map(|c| c.summary.as_str())
            .unwrap_or("");
        info!(app_id = %record.app_id, summary, "notification");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FilePushSink
// ---------------------------------------------------------------------------

/// Appends each notification as one JSON line.
pub struct FilePushSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FilePushSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl PushSink for FilePushSink {
    async fn post(&self, record: &NotificationRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let path = self.path.clone();
        let _guard = self.lock.lock().await;
        io::blocking(move || io::append_line(&path, &line))
            .await
            .map_err(|e| delivery_error(record, e))
    }
}

// ---------------------------------------------------------------------------
// HttpPushSink
// ---------------------------------------------------------------------------

/// POSTs `{"appId": ..., "message": {...}}` to a push endpoint.
pub struct HttpPushSink {
    client: reqwest::Client,
    url: String,
}

impl HttpPushSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PolldError::Config(format!("push client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushSink for HttpPushSink {
    async fn post(&self, record: &NotificationRecord) -> Result<()> {
        let body = serde_json::json!({
            "appId": record.app_id,
            "message": record.payload,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| delivery_error(record, e))?;
        if !resp.status().is_success() {
            return Err(delivery_error(
                record,
                format!("push service answered {}", resp.status()),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPushSink
// ---------------------------------------------------------------------------

/// Keeps every posted record; can be told to reject posts for one app id.
#[derive(Default)]
pub struct MemoryPushSink {
    posted: Mutex<Vec<NotificationRecord>>,
    reject_app_id: Option<String>,
}

impl MemoryPushSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(app_id: impl Into<String>) -> Self {
        Self {
            reject_app_id: Some(app_id.into()),
            ..Default::default()
        }
    }

    pub fn posted(&self) -> Vec<NotificationRecord> {
        self.posted.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushSink for MemoryPushSink {
    async fn post(&self, record: &NotificationRecord) -> Result<()> {
        if self.reject_app_id.as_deref() == Some(record.app_id.as_str()) {
            return Err(delivery_error(record, "rejected"));
        }
        if let Ok(mut p) = self.posted.lock() {
            p.push(record.clone());
        }
        Ok(())
    }
}
