//! HTTP-facing error mapping: turns [`PipelineError`] into the status
//! codes and JSON bodies named in §6 and §7 of the specification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mailcloud_core::PipelineError;
use serde_json::json;

/// Wraps a [`PipelineError`] so it can be returned directly from an axum
/// handler; the `From` impl is the single place that decides the HTTP
/// status for each taxonomy variant.
pub struct WebhookHandlerError(pub PipelineError);

impl From<PipelineError> for WebhookHandlerError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            PipelineError::InvalidPayload { message } => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            PipelineError::Unauthenticated { reason } => {
                (StatusCode::UNAUTHORIZED, json!({ "error": reason }))
            }
            PipelineError::RateLimited { tenant_id } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": format!("tenant '{tenant_id}' exceeded its rate limit") }),
            ),
            PipelineError::TransientUpstream { upstream, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("{upstream}: {message}") }),
            ),
            PipelineError::PermanentProcessing { .. }
            | PipelineError::MalformedDelivery { .. }
            | PipelineError::Configuration { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.0.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
