//! Subset of the Bot Framework activity schema the relay reads and writes.

use serde::{Deserialize, Serialize};

use super::conversation::{ChannelAccount, ConversationAccount, ConversationReference};
use super::null_as_default;

pub const INSTALLATION_UPDATE: &str = "installationUpdate";
pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
pub const INVOKE: &str = "invoke";

/// Invoke name used by Adaptive Card `Action.Execute` submissions.
pub const ADAPTIVE_CARD_ACTION: &str = "adaptiveCard/action";

/// Content type of a plain-text invoke reply.
pub const ACTIVITY_MESSAGE_TYPE: &str = "application/vnd.microsoft.activity.message";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `add` / `remove` on installation updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Activity {
    /// Builds the reference to store for this activity's conversation.
    ///
    /// Returns `None` when the activity carries no conversation id, since
    /// there is nothing to key the entry on.
    pub fn conversation_reference(&self) -> Option<ConversationReference> {
        let conversation = self.conversation.as_ref().filter(|c| !c.id.is_empty())?;

        Some(ConversationReference {
            channel_id: self.channel_id.clone().unwrap_or_default(),
            service_url: self.service_url.clone().unwrap_or_default(),
            conversation: conversation.clone(),
            bot: self.recipient.clone().unwrap_or_default(),
            tenant_id: conversation.tenant_id.clone(),
        })
    }

    /// True when the bot itself is one of the members just added.
    pub fn bot_was_added(&self) -> bool {
        match &self.recipient {
            Some(bot) if !bot.id.is_empty() => self.members_added.iter().any(|m| m.id == bot.id),
            _ => false,
        }
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.from
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}

/// Synchronous reply to an invoke activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeResponse {
    pub status: u16,
    pub body: InvokeResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponseBody {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub content_type: String,
    pub value: String,
}

impl InvokeResponse {
    /// A text reply shown to the user who pressed the card button.
    pub fn message(status: u16, value: impl Into<String>) -> Self {
        Self {
            status,
            body: InvokeResponseBody {
                status_code: status,
                content_type: ACTIVITY_MESSAGE_TYPE.to_string(),
                value: value.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
