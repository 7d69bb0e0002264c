use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conversation store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("approval gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("approval request failed with status {status}: {body}")]
    GatewayRejected { status: u16, body: String },

    #[error("corrupt conversation reference: {0}")]
    Decode(String),

    #[error("No conversation references found")]
    NoRecipients,

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("invalid or missing function key")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayUnreachable(_) | AppError::GatewayRejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Decode(_)
            | AppError::NoRecipients
            | AppError::Delivery(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
