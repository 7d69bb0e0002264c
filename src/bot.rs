//! Activity handling for the approvals bot.
//!
//! - `installationUpdate` / `conversationUpdate`: remember the conversation
//!   and greet it
//! - `invoke`: route card decisions through [`DecisionRouter`]
//! - everything else is acknowledged and ignored

use std::sync::Arc;

use crate::approval::DecisionRouter;
use crate::errors::AppError;
use crate::models::activity::{Activity, InvokeResponse, CONVERSATION_UPDATE, INSTALLATION_UPDATE, INVOKE};
use crate::notification::connector::{outbound_activity, text_message, ConversationSender};
use crate::store::ReferenceStore;

pub const WELCOME_MESSAGE: &str =
    "Hi! I'm the BeyondTrust PRA approvals bot. I'll notify you of any approval requests.";

pub struct ApprovalBot {
    store: Arc<ReferenceStore>,
    sender: Arc<dyn ConversationSender>,
    router: DecisionRouter,
    prune_on_uninstall: bool,
}

impl ApprovalBot {
    pub fn new(
        store: Arc<ReferenceStore>,
        sender: Arc<dyn ConversationSender>,
        router: DecisionRouter,
        prune_on_uninstall: bool,
    ) -> Self {
        Self {
            store,
            sender,
            router,
            prune_on_uninstall,
        }
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Handles one inbound activity. Invokes always yield a reply.
    pub async fn on_activity(&self, activity: &Activity) -> Result<Option<InvokeResponse>, AppError> {
        match activity.activity_type.as_str() {
            INSTALLATION_UPDATE => {
                self.on_installation_update(activity).await?;
                Ok(None)
            }
            CONVERSATION_UPDATE => {
                self.on_conversation_update(activity).await?;
                Ok(None)
            }
            INVOKE => Ok(Some(self.router.handle_invoke(activity).await)),
            other => {
                tracing::debug!(activity_type = other, "ignoring activity");
                Ok(None)
            }
        }
    }

    async fn on_installation_update(&self, activity: &Activity) -> Result<(), AppError> {
        match activity.action.as_deref() {
            Some("add") => {
                self.register(activity).await;
                self.welcome(activity).await
            }
            Some("remove") if self.prune_on_uninstall => {
                self.prune(activity).await;
                Ok(())
            }
            action => {
                tracing::debug!(action = ?action, "installation update ignored");
                Ok(())
            }
        }
    }

    async fn on_conversation_update(&self, activity: &Activity) -> Result<(), AppError> {
        self.register(activity).await;
        if activity.bot_was_added() {
            self.welcome(activity).await?;
        }
        Ok(())
    }

    /// Best effort: a storage failure is logged and the turn carries on.
    async fn register(&self, activity: &Activity) {
        let Some(reference) = activity.conversation_reference() else {
            tracing::warn!(
                activity_type = %activity.activity_type,
                "activity has no conversation id, not registering"
            );
            return;
        };

        if let Err(e) = self.store.upsert(&reference).await {
            tracing::error!(
                conversation_id = %reference.conversation_id(),
                error = %e,
                "failed to store conversation reference"
            );
        }
    }

    async fn prune(&self, activity: &Activity) {
        let Some(conversation_id) = activity.conversation.as_ref().map(|c| c.id.as_str()) else {
            return;
        };
        match self.store.remove(conversation_id).await {
            Ok(removed) => {
                tracing::info!(conversation_id, removed, "bot uninstalled from conversation")
            }
            Err(e) => tracing::error!(
                conversation_id,
                error = %e,
                "failed to prune conversation reference"
            ),
        }
    }

    async fn welcome(&self, activity: &Activity) -> Result<(), AppError> {
        let Some(reference) = activity.conversation_reference() else {
            return Ok(());
        };
        let greeting = outbound_activity(&reference, &text_message(WELCOME_MESSAGE));
        self.sender.send(&reference, &greeting).await
    }
}
