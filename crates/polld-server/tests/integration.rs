use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use polld_core::manifest::{ManifestSource, PluginManifest, PluginManifestEntry};
use polld_core::push::MemoryPushSink;
use polld_core::registry::{AccountsFile, MemoryAccountRegistry};
use polld_core::types::AccountData;
use polld_core::{InvocationResult, Invoker, PollHandle, Poller, PollerOptions};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Invoker that finds nothing new after a fixed delay.
struct SlowInvoker(Duration);

#[async_trait]
impl Invoker for SlowInvoker {
    async fn invoke(
        &self,
        _data: &AccountData,
        _entry: &PluginManifestEntry,
        _timeout: Duration,
    ) -> InvocationResult {
        tokio::time::sleep(self.0).await;
        InvocationResult::Success(vec![])
    }
}

const ACCOUNTS: &str = r#"
accounts:
  - id: 1
    services:
      - id: coolmail
        plugin: mail
"#;

/// Start a poller over one account whose only plugin takes `delay` to run.
fn poller(delay: Duration) -> PollHandle {
    let accounts: AccountsFile = serde_yaml::from_str(ACCOUNTS).unwrap();
    let manifest = PluginManifest::from_entries([PluginManifestEntry {
        plugin_id: "mail".into(),
        app_id: "com.example.mail_mail".into(),
        exec: PathBuf::from("/usr/lib/plugins/mail"),
        args: vec![],
        profile: "unconfined".into(),
        needs_authentication_data: false,
    }]);
    Poller::new(
        Arc::new(MemoryAccountRegistry::new(accounts)),
        Arc::new(SlowInvoker(delay)),
        Arc::new(MemoryPushSink::new()),
        ManifestSource::Fixed(manifest),
        PollerOptions::default(),
    )
    .spawn()
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send an empty POST request via `oneshot` and return (status, parsed JSON body).
async fn post(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_starts_idle() {
    let app = polld_server::build_router(poller(Duration::ZERO));
    let (status, json) = get(app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["phase"], "idle");
    assert_eq!(json["cycle"], 0);
    assert_eq!(json["last_cycle"], serde_json::Value::Null);
}

#[tokio::test]
async fn poll_is_accepted_then_queued_then_rejected() {
    let app = polld_server::build_router(poller(Duration::from_millis(500)));

    let (status, json) = post(app.clone(), "/api/poll").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "started");
    assert_eq!(json["cycle"], 1);

    let (status, json) = post(app.clone(), "/api/poll").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "queued");
    assert_eq!(json["position"], 1);

    let (status, json) = post(app.clone(), "/api/poll").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("in progress"));

    let (_, json) = get(app, "/api/status").await;
    assert_eq!(json["queued"], 1);
}

#[tokio::test]
async fn cancel_when_idle_reports_nothing_cancelled() {
    let app = polld_server::build_router(poller(Duration::ZERO));
    let (status, json) = post(app, "/api/cancel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], false);
}

#[tokio::test]
async fn cancel_stops_running_cycle() {
    let handle = poller(Duration::from_secs(30));
    let app = polld_server::build_router(handle.clone());

    post(app.clone(), "/api/poll").await;
    let (status, json) = post(app.clone(), "/api/cancel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], true);

    let (_, json) = get(app, "/api/status").await;
    assert_eq!(json["phase"], "idle");
    assert_eq!(json["cycles_cancelled"], 1);
    assert_eq!(json["last_cycle"]["cancelled"], true);
}

#[tokio::test]
async fn stopped_poller_returns_503() {
    let handle = poller(Duration::ZERO);
    handle.shutdown().await.unwrap();
    let app = polld_server::build_router(handle);
    let (status, _) = post(app, "/api/poll").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn events_stream_emits_done() {
    let handle = poller(Duration::from_millis(20));
    let app = polld_server::build_router(handle.clone());

    let req = axum::http::Request::builder()
        .uri("/api/events")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.starts_with("text/event-stream"), "got {ct}");

    // The stream is subscribed once the handler has run.
    handle.request_poll().await.unwrap();

    let mut body = response.into_body();
    let mut seen = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !seen.contains("event: done") {
            let frame = body.frame().await.unwrap().unwrap();
            if let Ok(data) = frame.into_data() {
                seen.push_str(&String::from_utf8_lossy(&data));
            }
        }
    })
    .await
    .expect("no done event received");
}
