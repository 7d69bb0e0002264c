//! Client for the privileged-access appliance's approval form.
//!
//! Stateless: each call canonicalizes the endpoint, builds the form the
//! appliance's approve/deny buttons would post, and relays the raw response.

use std::time::Duration;

use url::Url;

use crate::errors::AppError;
use crate::models::approval::{ApprovalOutcome, AuthKey, Decision};

/// Path of the appliance action that accepts approve/deny submissions.
pub const ACTION_PATH: &str = "approve_jump_request";

/// One decision to submit to the appliance.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub decision: Decision,
    pub message: String,
    pub approval_url: String,
    pub auth_key: AuthKey,
}

/// Canonical action URL for whatever form of base URL the caller supplied.
///
/// Adds `https://` when there is no scheme and appends the action path when
/// missing. Query parameters are kept and fragments dropped. Applying it
/// twice gives the same result.
pub fn canonical_endpoint(raw: &str) -> Result<Url, AppError> {
    let raw = raw.trim();
    let parsed = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{}", raw))
    };
    let mut url = parsed.map_err(|e| AppError::Validation(format!("invalid approvalUrl: {}", e)))?;
    url.set_fragment(None);

    let has_action = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .is_some_and(|last| last == ACTION_PATH);

    url.path_segments_mut()
        .map(|mut segments| {
            segments.pop_if_empty();
            if !has_action {
                segments.push(ACTION_PATH);
            }
        })
        .map_err(|_| AppError::Validation("invalid approvalUrl: not a base URL".into()))?;

    Ok(url)
}

/// Form fields for a decision: the key, the comment, and exactly one of the
/// two button values.
pub fn decision_form<'a>(
    decision: Decision,
    message: &'a str,
    auth_key: &'a AuthKey,
) -> Vec<(&'static str, &'a str)> {
    let button = match decision {
        Decision::Approved => ("approved", "Approve"),
        Decision::Denied => ("denied", "Deny"),
    };
    vec![
        ("authKey", auth_key.expose()),
        ("comments", message),
        button,
    ]
}

#[derive(Clone)]
pub struct ApprovalGateway {
    client: reqwest::Client,
}

impl ApprovalGateway {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent("ApprovalRelay/1.0")
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Posts the decision to the appliance.
    ///
    /// The key travels both in the form body and as a query parameter, since
    /// appliance versions differ in which one they read.
    pub async fn submit(&self, req: &GatewayRequest) -> Result<ApprovalOutcome, AppError> {
        let url = canonical_endpoint(&req.approval_url)?;

        tracing::info!(
            host = url.host_str().unwrap_or_default(),
            decision = %req.decision,
            "submitting approval decision"
        );

        let resp = self
            .client
            .post(url)
            .query(&[("authKey", req.auth_key.expose())])
            .form(&decision_form(req.decision, &req.message, &req.auth_key))
            .send()
            .await
            // The URL carries the key; keep it out of the error text.
            .map_err(|e| AppError::GatewayUnreachable(e.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::GatewayUnreachable(e.without_url().to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, "approval gateway rejected decision");
            return Err(AppError::GatewayRejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = %status, bytes = body.len(), "approval gateway accepted decision");
        Ok(ApprovalOutcome { detail: body })
    }
}

impl Default for ApprovalGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn canonical(raw: &str) -> String {
        canonical_endpoint(raw).unwrap().to_string()
    }

    #[test]
    fn test_canonical_endpoint() {
        assert_eq!(canonical("example.com"), "https://example.com/approve_jump_request");
        assert_eq!(
            canonical("https://example.com/approve_jump_request"),
            "https://example.com/approve_jump_request"
        );
        assert_eq!(canonical("https://example.com"), "https://example.com/approve_jump_request");
        assert_eq!(canonical("https://example.com/"), "https://example.com/approve_jump_request");
        assert_eq!(
            canonical("http://10.0.0.5:8080"),
            "http://10.0.0.5:8080/approve_jump_request"
        );
    }

    #[test]
    fn test_canonical_endpoint_keeps_query() {
        assert_eq!(
            canonical("https://pra.example.com/?site=1"),
            "https://pra.example.com/approve_jump_request?site=1"
        );
        assert_eq!(
            canonical("pra.example.com/portal?site=1#top"),
            "https://pra.example.com/portal/approve_jump_request?site=1"
        );
        assert_eq!(
            canonical("https://pra.example.com/approve_jump_request/?site=1"),
            "https://pra.example.com/approve_jump_request?site=1"
        );
    }

    #[test]
    fn test_canonical_endpoint_is_idempotent() {
        for raw in [
            "example.com",
            "https://example.com/",
            "pra.corp/approve_jump_request/",
            "https://pra.example.com/?site=1",
        ] {
            let once = canonical(raw);
            assert_eq!(canonical(&once), once);
        }
    }

    #[test]
    fn test_canonical_endpoint_rejects_garbage() {
        assert!(matches!(canonical_endpoint(""), Err(AppError::Validation(_))));
        assert!(matches!(
            canonical_endpoint("https://exa mple.com"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_approved_form_has_no_denied_key() {
        let key = AuthKey::new("k");
        let form = decision_form(Decision::Approved, "fine", &key);
        assert!(form.contains(&("approved", "Approve")));
        assert!(form.iter().all(|(k, _)| *k != "denied"));
        assert!(form.contains(&("comments", "fine")));
        assert!(form.contains(&("authKey", "k")));
    }

    #[test]
    fn test_any_other_decision_is_a_denial() {
        let key = AuthKey::new("k");
        let form = decision_form(Decision::parse("rejected"), "no", &key);
        assert!(form.contains(&("denied", "Deny")));
        assert!(form.iter().all(|(k, _)| *k != "approved"));
    }

    fn request(decision: Decision, approval_url: String) -> GatewayRequest {
        GatewayRequest {
            decision,
            message: "maintenance window".into(),
            approval_url,
            auth_key: AuthKey::new("secret-key"),
        }
    }

    #[tokio::test]
    async fn test_submit_posts_form_and_relays_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/approve_jump_request"))
            .and(query_param("authKey", "secret-key"))
            .and(body_string_contains("approved=Approve"))
            .and(body_string_contains("comments=maintenance+window"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = ApprovalGateway::new()
            .submit(&request(Decision::Approved, server.uri()))
            .await
            .unwrap();
        assert_eq!(outcome.detail, "<ok/>");
    }

    #[tokio::test]
    async fn test_submit_keeps_base_url_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/approve_jump_request"))
            .and(query_param("site", "1"))
            .and(query_param("authKey", "secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
            .expect(1)
            .mount(&server)
            .await;

        ApprovalGateway::new()
            .submit(&request(Decision::Denied, format!("{}/?site=1", server.uri())))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/approve_jump_request"))
            .respond_with(ResponseTemplate::new(403).set_body_string("session expired"))
            .mount(&server)
            .await;

        let err = ApprovalGateway::new()
            .submit(&request(Decision::Denied, server.uri()))
            .await
            .unwrap_err();
        match err {
            AppError::GatewayRejected { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "session expired");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_gateway_hides_key() {
        let err = ApprovalGateway::new()
            .submit(&request(Decision::Approved, "http://127.0.0.1:1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GatewayUnreachable(_)));
        assert!(!err.to_string().contains("secret-key"));
    }
}
