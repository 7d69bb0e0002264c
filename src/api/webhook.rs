use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;

use super::BotState;

/// `POST /api/webhook` — broadcast the JSON body to every registered
/// conversation. Replies in plain text.
pub async fn handle_webhook(
    State(state): State<Arc<BotState>>,
    Json(payload): Json<Value>,
) -> (StatusCode, String) {
    tracing::info!("notification webhook received");

    match state.fanout.dispatch(&payload).await {
        Ok(report) => {
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failed,
                "webhook fan-out finished"
            );
            (StatusCode::OK, "Notifications sent successfully".to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "webhook fan-out failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
