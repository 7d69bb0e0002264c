use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::approval::ApprovalGateway;
use crate::bot::ApprovalBot;
use crate::notification::FanoutDispatcher;

pub mod decisions;
pub mod messages;
pub mod webhook;

/// State shared by the bot server's handlers.
pub struct BotState {
    pub bot: ApprovalBot,
    pub fanout: FanoutDispatcher,
}

/// State for the decision-processing endpoint.
pub struct DecisionState {
    pub gateway: ApprovalGateway,
    /// Expected `x-functions-key`. `None` accepts every caller.
    pub function_key: Option<String>,
}

/// Routes served by `approval-relay bot`.
pub fn bot_router(state: Arc<BotState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/api/messages", post(messages::handle_activity))
        .route("/api/webhook", post(webhook::handle_webhook))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(request_id_middleware))
}

/// Routes served by `approval-relay decisions`.
pub fn decisions_router(state: Arc<DecisionState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/handleapproval", post(decisions::handle_approval))
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(middleware::from_fn(request_id_middleware))
}

/// Request span carrying the path only. Query strings on these routes hold
/// access keys and must stay out of the logs.
fn request_span(req: &Request) -> Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        version = ?req.version(),
    )
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Ready once the conversation store has been reached at least once.
async fn readiness_check(State(state): State<Arc<BotState>>) -> (StatusCode, &'static str) {
    match state.bot.store().ensure_ready().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "store unavailable"),
    }
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

