use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::conversation::ConversationReference;

pub const DEFAULT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
/// Refresh this long before the platform says the token expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
/// `serviceUrl` hosts allowed to receive a bearer token. `*.` matches any
/// subdomain.
pub const DEFAULT_TRUSTED_HOSTS: &[&str] = &["smba.trafficmanager.net", "*.botframework.com"];

// ── Outbound Activities ──────────────────────────────────────

/// Pushes an activity into a stored conversation.
#[async_trait]
pub trait ConversationSender: Send + Sync {
    async fn send(&self, reference: &ConversationReference, activity: &Value)
        -> Result<(), AppError>;
}

/// Addresses `payload` to the referenced conversation.
///
/// Objects with a `type` are sent as-is. Typeless objects that already carry
/// `text` or `attachments` become `message` activities; any other payload is
/// rendered into the text of a message.
pub fn outbound_activity(reference: &ConversationReference, payload: &Value) -> Value {
    let mut activity = match payload {
        Value::Object(map)
            if ["type", "text", "attachments"].iter().any(|k| map.contains_key(*k)) =>
        {
            Value::Object(map.clone())
        }
        Value::String(text) => json!({ "text": text }),
        other => json!({ "text": other.to_string() }),
    };

    if let Some(fields) = activity.as_object_mut() {
        fields
            .entry("type")
            .or_insert_with(|| Value::String("message".into()));
        fields.insert("channelId".into(), json!(reference.channel_id));
        fields.insert("serviceUrl".into(), json!(reference.service_url));
        fields.insert("conversation".into(), json!(&reference.conversation));
        fields.insert("from".into(), json!(&reference.bot));
    }
    activity
}

pub fn text_message(text: &str) -> Value {
    json!({ "type": "message", "text": text })
}

// ── Bot Connector Client ─────────────────────────────────────

/// Messaging-platform app registration used to mint outbound tokens.
#[derive(Clone)]
pub struct BotCredentials {
    pub app_id: String,
    pub app_password: String,
}

impl fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCredentials")
            .field("app_id", &self.app_id)
            .field("app_password", &"****")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Sends activities through the Bot Connector REST API
/// (`POST {serviceUrl}/v3/conversations/{id}/activities`).
///
/// Without credentials requests go out unauthenticated, which is what the
/// local emulator expects. With credentials, only trusted hosts are contacted.
pub struct BotConnectorClient {
    client: reqwest::Client,
    credentials: Option<BotCredentials>,
    token_url: String,
    trusted_hosts: Vec<String>,
    token: Mutex<Option<CachedToken>>,
}

impl BotConnectorClient {
    pub fn new(credentials: Option<BotCredentials>, token_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(5))
                .user_agent("ApprovalRelay/1.0")
                .build()
                .expect("failed to build HTTP client"),
            credentials,
            token_url: token_url.into(),
            trusted_hosts: DEFAULT_TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect(),
            token: Mutex::new(None),
        }
    }

    pub fn with_trusted_hosts(mut self, hosts: Vec<String>) -> Self {
        self.trusted_hosts = hosts;
        self
    }

    /// Refuses to hand a token to a host outside the trusted list.
    fn check_trusted(&self, url: &str) -> Result<(), AppError> {
        if self.credentials.is_none() {
            return Ok(());
        }
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        match host {
            Some(host) if host_is_trusted(&self.trusted_hosts, &host) => Ok(()),
            host => {
                let host = host.unwrap_or_default();
                warn!(host = %host, "refusing delivery to untrusted service URL");
                Err(AppError::Delivery(format!(
                    "service URL host {:?} is not trusted",
                    host
                )))
            }
        }
    }

    /// Returns a cached bearer token, fetching a new one when it is close to
    /// expiry.
    async fn bearer_token(&self) -> Result<Option<String>, AppError> {
        let Some(creds) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(Some(token.access_token.clone()));
            }
        }

        debug!(app_id = %creds.app_id, "requesting bot connector token");
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.app_id.as_str()),
                ("client_secret", creds.app_password.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Delivery(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("malformed token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        info!(expires_in = token.expires_in, "bot connector token refreshed");
        Ok(Some(token.access_token))
    }
}

fn host_is_trusted(trusted: &[String], host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    trusted.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(suffix) => host.ends_with(&format!(".{}", suffix)),
            None => host == pattern,
        }
    })
}

pub fn activities_url(reference: &ConversationReference) -> Result<String, AppError> {
    let service_url = reference.service_url.trim_end_matches('/');
    if service_url.is_empty() {
        return Err(AppError::Delivery(format!(
            "conversation {} has no service URL",
            reference.conversation_id()
        )));
    }
    Ok(format!(
        "{}/v3/conversations/{}/activities",
        service_url,
        urlencoding::encode(reference.conversation_id())
    ))
}

#[async_trait]
impl ConversationSender for BotConnectorClient {
    async fn send(
        &self,
        reference: &ConversationReference,
        activity: &Value,
    ) -> Result<(), AppError> {
        let url = activities_url(reference)?;
        self.check_trusted(&url)?;

        let mut req = self.client.post(&url).json(activity);
        if let Some(token) = self.bearer_token().await? {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                conversation_id = %reference.conversation_id(),
                status = %status,
                body = %body,
                "bot connector rejected activity"
            );
            return Err(AppError::Delivery(format!(
                "bot connector returned {}: {}",
                status, body
            )));
        }

        debug!(
            conversation_id = %reference.conversation_id(),
            status = %status,
            "activity delivered"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::{ChannelAccount, ConversationAccount};
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reference(service_url: &str) -> ConversationReference {
        ConversationReference {
            channel_id: "msteams".into(),
            service_url: service_url.into(),
            conversation: ConversationAccount {
                id: "19:ops@thread.tacv2".into(),
                ..Default::default()
            },
            bot: ChannelAccount {
                id: "28:bot".into(),
                name: Some("Approvals".into()),
                aad_object_id: None,
            },
            tenant_id: None,
        }
    }

    #[test]
    fn test_object_payload_becomes_message_activity() {
        let payload = json!({ "attachments": [{ "contentType": "application/vnd.microsoft.card.adaptive" }] });
        let activity = outbound_activity(&reference("https://svc/"), &payload);
        assert_eq!(activity["type"], "message");
        assert_eq!(activity["conversation"]["id"], "19:ops@thread.tacv2");
        assert_eq!(activity["from"]["id"], "28:bot");
        assert!(activity["attachments"].is_array());
    }

    #[test]
    fn test_bare_object_is_rendered_as_text() {
        let payload = json!({ "requestId": "1234", "user": "bob" });
        let activity = outbound_activity(&reference("https://svc/"), &payload);
        assert_eq!(activity["type"], "message");
        assert!(activity.get("requestId").is_none());

        let text = activity["text"].as_str().unwrap();
        let rendered: Value = serde_json::from_str(text).unwrap();
        assert_eq!(rendered, payload);
    }

    #[test]
    fn test_explicit_type_is_kept() {
        let activity = outbound_activity(&reference("https://svc/"), &json!({ "type": "typing" }));
        assert_eq!(activity["type"], "typing");
    }

    #[test]
    fn test_scalar_payload_becomes_text() {
        let activity = outbound_activity(&reference("https://svc/"), &json!("hello"));
        assert_eq!(activity["text"], "hello");
        let activity = outbound_activity(&reference("https://svc/"), &json!(42));
        assert_eq!(activity["text"], "42");
    }

    #[test]
    fn test_activities_url_encodes_conversation_id() {
        let url = activities_url(&reference("https://smba.example/amer/")).unwrap();
        assert_eq!(
            url,
            "https://smba.example/amer/v3/conversations/19%3Aops%40thread.tacv2/activities"
        );
        assert!(activities_url(&reference("")).is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = BotCredentials {
            app_id: "app".into(),
            app_password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_send_fetches_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3600,
                "access_token": "tok-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/conversations/19%3Aops%40thread.tacv2/activities"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(json!({ "type": "message", "text": "hi" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "a1" })))
            .expect(2)
            .mount(&server)
            .await;

        let client = BotConnectorClient::new(
            Some(BotCredentials {
                app_id: "app".into(),
                app_password: "secret".into(),
            }),
            format!("{}/token", server.uri()),
        )
        .with_trusted_hosts(vec!["127.0.0.1".into()]);
        let reference = reference(&server.uri());
        let activity = outbound_activity(&reference, &text_message("hi"));

        client.send(&reference, &activity).await.unwrap();
        client.send(&reference, &activity).await.unwrap();
    }

    #[test]
    fn test_host_matching() {
        let trusted: Vec<String> = DEFAULT_TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect();
        assert!(host_is_trusted(&trusted, "smba.trafficmanager.net"));
        assert!(host_is_trusted(&trusted, "europe.webchat.BotFramework.com"));
        assert!(!host_is_trusted(&trusted, "botframework.com.evil.example"));
        assert!(!host_is_trusted(&trusted, "evilbotframework.com"));
        assert!(!host_is_trusted(&trusted, "127.0.0.1"));
    }

    #[tokio::test]
    async fn test_token_never_sent_to_untrusted_host() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = BotConnectorClient::new(
            Some(BotCredentials {
                app_id: "app".into(),
                app_password: "secret".into(),
            }),
            format!("{}/token", server.uri()),
        );
        let reference = reference(&server.uri());
        let err = client
            .send(&reference, &text_message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        assert!(err.to_string().contains("not trusted"), "{err}");
    }

    #[tokio::test]
    async fn test_send_surfaces_connector_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bot not in conversation"))
            .mount(&server)
            .await;

        let client = BotConnectorClient::new(None, DEFAULT_TOKEN_URL);
        let reference = reference(&server.uri());
        let err = client
            .send(&reference, &text_message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        assert!(err.to_string().contains("bot not in conversation"));
    }
}
