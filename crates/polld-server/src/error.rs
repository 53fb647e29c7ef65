use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use polld_core::PolldError;

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<PolldError>() {
            Some(PolldError::OverlappingPollRequest) => StatusCode::CONFLICT,
            Some(PolldError::PollerStopped) => StatusCode::SERVICE_UNAVAILABLE,
            Some(PolldError::AccountNotFound(_)) => StatusCode::NOT_FOUND,
            Some(PolldError::Config(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
