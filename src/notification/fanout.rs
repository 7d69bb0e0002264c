use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{info, warn};

use super::connector::{outbound_activity, ConversationSender};
use crate::errors::AppError;
use crate::store::ReferenceStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Broadcasts one payload to every registered conversation.
pub struct FanoutDispatcher {
    store: Arc<ReferenceStore>,
    sender: Arc<dyn ConversationSender>,
}

impl FanoutDispatcher {
    pub fn new(store: Arc<ReferenceStore>, sender: Arc<dyn ConversationSender>) -> Self {
        Self { store, sender }
    }

    /// Delivers `payload` to each conversation in turn.
    ///
    /// A failed delivery is logged and counted; the rest still go out. Errors
    /// only when the registry cannot be read or holds no conversations.
    pub async fn dispatch(&self, payload: &Value) -> Result<FanoutReport, AppError> {
        let mut references = self.store.list_all().await?;
        let mut report = FanoutReport::default();

        while let Some(reference) = references.next().await {
            let conversation_id = reference.conversation_id().to_string();
            let activity = outbound_activity(&reference, payload);

            match self.sender.send(&reference, &activity).await {
                Ok(()) => {
                    info!(conversation_id = %conversation_id, "notification delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(conversation_id = %conversation_id, error = %e, "notification delivery failed");
                    report.failed += 1;
                }
            }
        }

        if report.attempted() == 0 {
            return Err(AppError::NoRecipients);
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "notification fan-out complete"
        );
        Ok(report)
    }
}
