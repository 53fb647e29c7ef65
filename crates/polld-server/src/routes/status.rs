use axum::extract::State;
use axum::Json;
use polld_core::orchestrator::PollStatus;

use crate::state::AppState;

/// GET /api/status: current phase, queue depth and the last cycle's summary.
pub async fn get_status(State(app): State<AppState>) -> Json<PollStatus> {
    Json(app.poller.status())
}
