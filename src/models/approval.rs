use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroize;

use crate::errors::AppError;

/// Stand-in for an approval comment the approver left empty.
pub const DEFAULT_MESSAGE: &str = "Not specified";
/// Stand-in for an invoke whose sender has no display name.
pub const UNKNOWN_USER: &str = "Unknown User";

/// The two outcomes an approver can choose. Anything other than
/// `"approved"` parses as a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn parse(raw: &str) -> Self {
        if raw == "approved" {
            Decision::Approved
        } else {
            Decision::Denied
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied => "denied",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session token for the external approval endpoint.
///
/// Never printed: `Debug` is redacted and the buffer is wiped on drop.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct AuthKey(String);

impl AuthKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(****)")
    }
}

impl Drop for AuthKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// How long an approved session stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDuration {
    Once,
    Seconds(u64),
}

impl fmt::Display for ApprovalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDuration::Once => f.write_str("Once"),
            ApprovalDuration::Seconds(secs) => write!(f, "{}", secs),
        }
    }
}

/// Raw `action.data` of an Adaptive Card submission, as the card posts it.
///
/// Every field is optional here; [`ApprovalActionRequest::normalize`] decides
/// what is required. Empty strings count as absent.
#[derive(Default, Deserialize)]
pub struct CardActionData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub decision: Option<String>,
    #[serde(default, rename = "requestId", deserialize_with = "lenient_string")]
    pub request_id: Option<String>,
    #[serde(
        default,
        rename = "ticketNumber",
        alias = "ticketId",
        deserialize_with = "lenient_string"
    )]
    pub ticket_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub approval_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration_seconds: Option<String>,
    #[serde(default, rename = "approvalUrl", deserialize_with = "lenient_string")]
    pub approval_url: Option<String>,
    #[serde(default, rename = "authKey", deserialize_with = "lenient_string")]
    pub auth_key: Option<String>,
}

/// Accepts a string or a number; blanks and other JSON types become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A fully populated approval decision, ready to forward.
#[derive(Debug, Clone)]
pub struct ApprovalActionRequest {
    pub decision: Decision,
    pub request_id: String,
    pub ticket_id: String,
    pub message: String,
    pub duration: ApprovalDuration,
    pub username: String,
    pub approval_url: String,
    pub auth_key: AuthKey,
}

impl ApprovalActionRequest {
    /// Validates a card submission and fills in every default.
    ///
    /// Required: `approvalUrl`, `authKey`, `decision`, `requestId`.
    /// Defaults: message `"Not specified"`, duration `Once` unless
    /// `duration_type == "seconds"` with a positive `duration_seconds`,
    /// username `"Unknown User"`.
    pub fn normalize(data: CardActionData, acting_user: Option<&str>) -> Result<Self, AppError> {
        let mut missing = Vec::new();
        if data.approval_url.is_none() {
            missing.push("approvalUrl");
        }
        if data.auth_key.is_none() {
            missing.push("authKey");
        }
        if data.decision.is_none() {
            missing.push("decision");
        }
        if data.request_id.is_none() {
            missing.push("requestId");
        }

        let (Some(approval_url), Some(auth_key), Some(decision), Some(request_id)) = (
            data.approval_url,
            data.auth_key,
            data.decision,
            data.request_id,
        ) else {
            return Err(AppError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        let duration = match (data.duration_type.as_deref(), data.duration_seconds.as_deref()) {
            (Some("seconds"), Some(raw)) => parse_seconds(raw)
                .map(ApprovalDuration::Seconds)
                .unwrap_or(ApprovalDuration::Once),
            _ => ApprovalDuration::Once,
        };

        Ok(Self {
            decision: Decision::parse(&decision),
            request_id,
            ticket_id: data.ticket_number.unwrap_or_default(),
            message: data
                .approval_message
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            duration,
            username: acting_user
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(UNKNOWN_USER)
                .to_string(),
            approval_url,
            auth_key: AuthKey::new(auth_key),
        })
    }
}

/// Whole, positive second counts only. Number inputs arrive as `"3600"` or
/// `"3600.0"` depending on how the card serialised them.
fn parse_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return (secs > 0).then_some(secs);
    }
    let secs = raw.parse::<f64>().ok()?;
    (secs > 0.0 && secs.fract() == 0.0 && secs <= u64::MAX as f64).then_some(secs as u64)
}

/// Result of forwarding one decision to the approval gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    /// Raw response body from the appliance.
    pub detail: String,
}
