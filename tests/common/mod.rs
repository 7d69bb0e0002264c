//! Shared fixtures for the HTTP-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use approval_relay::api::{self, BotState, DecisionState};
use approval_relay::approval::{ApprovalGateway, DecisionRouter};
use approval_relay::bot::ApprovalBot;
use approval_relay::notification::{BotConnectorClient, FanoutDispatcher};
use approval_relay::store::table::{MemoryConnector, TableConnector};
use approval_relay::store::ReferenceStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub const FUNCTION_KEY: &str = "fn-test-key";

/// Bot server backed by an in-memory registry and an unauthenticated
/// connector client.
pub fn bot_app(function_url: &str) -> (Router, Arc<ReferenceStore>) {
    bot_app_with_store(function_url, Arc::new(MemoryConnector::default()))
}

pub fn bot_app_with_store(
    function_url: &str,
    connector: Arc<dyn TableConnector>,
) -> (Router, Arc<ReferenceStore>) {
    let store = Arc::new(ReferenceStore::new(connector));
    let sender = Arc::new(BotConnectorClient::new(None, "http://127.0.0.1:1/token"));
    let router = DecisionRouter::new(function_url, Some(FUNCTION_KEY.to_string()));

    let state = Arc::new(BotState {
        bot: ApprovalBot::new(store.clone(), sender.clone(), router, true),
        fanout: FanoutDispatcher::new(store.clone(), sender),
    });
    (api::bot_router(state), store)
}

pub fn decisions_app(function_key: Option<&str>) -> Router {
    api::decisions_router(Arc::new(DecisionState {
        gateway: ApprovalGateway::new(),
        function_key: function_key.map(String::from),
    }))
}

/// Serves the decision endpoint on an ephemeral port and returns its URL.
pub async fn spawn_decisions(function_key: Option<&str>) -> String {
    let app = decisions_app(function_key);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api/handleapproval", addr)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}
