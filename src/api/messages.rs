use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::BotState;
use crate::models::activity::Activity;

/// `POST /api/messages` — inbound Bot Framework activities.
///
/// Invokes are answered with their invoke response; other activities get an
/// empty 200. A failed turn becomes a 500 instead of dropping the request.
pub async fn handle_activity(
    State(state): State<Arc<BotState>>,
    Json(activity): Json<Activity>,
) -> Response {
    tracing::debug!(
        activity_type = %activity.activity_type,
        name = ?activity.name,
        conversation_id = ?activity.conversation.as_ref().map(|c| c.id.as_str()),
        "received activity"
    );

    match state.bot.on_activity(&activity).await {
        Ok(Some(invoke)) => {
            let status =
                StatusCode::from_u16(invoke.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(invoke.body)).into_response()
        }
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(
                activity_type = %activity.activity_type,
                error = %e,
                "unhandled error in turn"
            );
            e.into_response()
        }
    }
}
