pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use polld_core::PollHandle;
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(poller: PollHandle) -> Router {
    let app_state = state::AppState::new(poller);

    Router::new()
        .route("/api/poll", post(routes::poll::request_poll))
        .route("/api/cancel", post(routes::poll::cancel_poll))
        .route("/api/status", get(routes::status::get_status))
        .route("/api/events", get(routes::events::sse_events))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve the control API on a pre-bound listener.
///
/// Taking a bound listener lets the caller read the actual port first
/// (useful with port 0). Runs until the listener fails; callers stop it by
/// dropping the future.
pub async fn serve_on(poller: PollHandle, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(poller);

    tracing::info!("control API listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
