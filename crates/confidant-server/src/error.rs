use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use confidant_core::ConfidantError;
use serde_json::json;

/// Maps [`ConfidantError`] onto an HTTP status and a `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError(pub ConfidantError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ConfidantError::Validation(_) => StatusCode::BAD_REQUEST,
            ConfidantError::NotFound { .. } => StatusCode::NOT_FOUND,
            ConfidantError::Conflict(_) => StatusCode::CONFLICT,
            ConfidantError::Completion { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            ConfidantError::Validation(message)
            | ConfidantError::Conflict(message)
            | ConfidantError::Completion { message, .. } => message.clone(),
            ConfidantError::NotFound { entity_type, .. } => format!("{entity_type} not found"),
            other => other.to_string(),
        }
    }
}

impl From<ConfidantError> for ApiError {
    fn from(err: ConfidantError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ConfidantError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;
