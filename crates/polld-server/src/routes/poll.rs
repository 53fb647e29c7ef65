use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use polld_core::orchestrator::PollAccepted;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/poll: request a poll cycle.
///
/// Answers as soon as the request is accepted: `202` with
/// `{"status":"started"|"queued","cycle":N}`, or `409` when a cycle is
/// running and the queue is full.
pub async fn request_poll(
    State(app): State<AppState>,
) -> Result<(StatusCode, Json<PollAccepted>), AppError> {
    let accepted = app.poller.request_poll().await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/cancel: cancel the running cycle, if any.
pub async fn cancel_poll(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = app.poller.cancel().await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}
