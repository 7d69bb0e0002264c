use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;

use super::DecisionState;
use crate::approval::router::FUNCTION_KEY_HEADER;
use crate::approval::GatewayRequest;
use crate::errors::AppError;
use crate::models::approval::{AuthKey, Decision};

/// Comment sent to the appliance when the caller passes none.
const DEFAULT_COMMENT: &str = "default";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionParams {
    pub decision: Option<String>,
    pub request_id: Option<String>,
    pub ticket_id: Option<String>,
    pub message: Option<String>,
    pub duration: Option<String>,
    pub username: Option<String>,
    pub approval_url: Option<String>,
    pub auth_key: Option<AuthKey>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub message: String,
    pub details: String,
}

/// `POST /api/handleapproval` — forward one decision to the appliance.
pub async fn handle_approval(
    State(state): State<Arc<DecisionState>>,
    headers: HeaderMap,
    Query(params): Query<DecisionParams>,
) -> Response {
    if !authorized(state.function_key.as_deref(), &headers) {
        tracing::warn!("decision endpoint: missing or invalid function key");
        return AppError::Unauthorized.into_response();
    }

    match process(&state, params).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "error handling approval decision");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn process(state: &DecisionState, params: DecisionParams) -> Result<DecisionResponse, AppError> {
    let approval_url = params.approval_url.filter(|u| !u.trim().is_empty());
    let auth_key = params.auth_key.filter(|k| !k.is_empty());
    let (Some(approval_url), Some(auth_key)) = (approval_url, auth_key) else {
        return Err(AppError::Validation(
            "Missing required parameters: approvalUrl or authKey".into(),
        ));
    };

    let decision = Decision::parse(params.decision.as_deref().unwrap_or_default());
    tracing::info!(
        decision = %decision,
        request_id = ?params.request_id,
        ticket_id = ?params.ticket_id,
        duration = ?params.duration,
        username = ?params.username,
        "processing approval decision"
    );

    let outcome = state
        .gateway
        .submit(&GatewayRequest {
            decision,
            message: params
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
            approval_url,
            auth_key,
        })
        .await?;

    Ok(DecisionResponse {
        message: format!("Request {} successfully processed", decision),
        details: outcome.detail,
    })
}

fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match headers
        .get(FUNCTION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(provided) => provided.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}
