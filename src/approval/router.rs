//! Turns an Adaptive Card approve/deny press into a call to the decision
//! endpoint, and the result into the invoke reply the approver sees.

use std::time::Duration;

use serde::Deserialize;

use crate::errors::AppError;
use crate::models::activity::{Activity, InvokeResponse, ADAPTIVE_CARD_ACTION, INVOKE};
use crate::models::approval::{ApprovalActionRequest, CardActionData};

/// Header carrying the decision endpoint's access key.
pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";

#[derive(Deserialize)]
struct InvokeValue {
    action: InvokeAction,
}

#[derive(Deserialize)]
struct InvokeAction {
    data: CardActionData,
}

#[derive(Clone)]
pub struct DecisionRouter {
    client: reqwest::Client,
    function_url: String,
    function_key: Option<String>,
}

impl DecisionRouter {
    /// No request timeout is set: the platform's own invoke deadline is the
    /// only bound.
    pub fn new(function_url: impl Into<String>, function_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            function_url: function_url.into(),
            function_key,
        }
    }

    /// Always produces a reply; failures become a 500 with the cause in the text.
    pub async fn handle_invoke(&self, activity: &Activity) -> InvokeResponse {
        let request = match Self::validate(activity) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejected card action");
                return InvokeResponse::message(500, format!("Error: {}", e));
            }
        };

        match self.dispatch(&request).await {
            Ok(()) => {
                tracing::info!(
                    decision = %request.decision,
                    request_id = %request.request_id,
                    ticket_id = %request.ticket_id,
                    username = %request.username,
                    "approval decision processed"
                );
                InvokeResponse::message(
                    200,
                    format!(
                        "Request {} successfully processed by {}.",
                        request.decision, request.username
                    ),
                )
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request.request_id,
                    error = %e,
                    "error processing approval action"
                );
                InvokeResponse::message(500, format!("Error: {}", e))
            }
        }
    }

    fn validate(activity: &Activity) -> Result<ApprovalActionRequest, AppError> {
        if activity.activity_type != INVOKE || activity.name.as_deref() != Some(ADAPTIVE_CARD_ACTION)
        {
            return Err(AppError::Validation(format!(
                "unsupported invoke: {}",
                activity.name.as_deref().unwrap_or("<none>")
            )));
        }

        let value = activity
            .value
            .clone()
            .ok_or_else(|| AppError::Validation("card action has no payload".into()))?;
        let invoke: InvokeValue = serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("malformed card action: {}", e)))?;

        ApprovalActionRequest::normalize(invoke.action.data, activity.sender_name())
    }

    async fn dispatch(&self, request: &ApprovalActionRequest) -> Result<(), AppError> {
        let duration = request.duration.to_string();
        let params = [
            ("decision", request.decision.as_str()),
            ("requestId", request.request_id.as_str()),
            ("ticketId", request.ticket_id.as_str()),
            ("message", request.message.as_str()),
            ("duration", duration.as_str()),
            ("username", request.username.as_str()),
            ("approvalUrl", request.approval_url.as_str()),
            ("authKey", request.auth_key.expose()),
        ];

        tracing::debug!(
            decision = %request.decision,
            request_id = %request.request_id,
            ticket_id = %request.ticket_id,
            duration = %duration,
            username = %request.username,
            "calling decision endpoint"
        );

        let mut req = self
            .client
            .post(&self.function_url)
            .header("content-type", "application/json")
            .query(&params);
        if let Some(key) = &self.function_key {
            req = req.header(FUNCTION_KEY_HEADER, key);
        }

        let resp = req.send().await.map_err(|e| {
            AppError::GatewayUnreachable(format!(
                "decision endpoint unreachable: {}",
                e.without_url()
            ))
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::GatewayUnreachable(e.without_url().to_string()))?;
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(&body);

        if !status.is_success() {
            let detail = parsed.map(|v| v.to_string()).unwrap_or(body);
            return Err(AppError::GatewayRejected {
                status: status.as_u16(),
                body: format!("Function call failed: {}", detail),
            });
        }

        let parsed = parsed.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("malformed decision endpoint response: {}", e))
        })?;
        tracing::debug!(response = %parsed, "decision endpoint response");
        Ok(())
    }
}
