//! Durable registry of every conversation the bot has been installed into.

use std::sync::Arc;

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::OnceCell;

use super::table::{TableBackend, TableConnector, TableEntity};
use crate::errors::AppError;
use crate::models::conversation::ConversationReference;

/// All references live under one logical partition.
pub const PARTITION: &str = "channel";

/// Lazily opened, shared connection to the backing table.
///
/// The first successful [`ensure_ready`](Self::ensure_ready) connects and
/// creates the table; later calls reuse that backend. A failed attempt leaves
/// the handle empty so the next call tries again.
pub struct ConnectionHandle {
    connector: Arc<dyn TableConnector>,
    backend: OnceCell<Arc<dyn TableBackend>>,
}

impl ConnectionHandle {
    pub fn new(connector: Arc<dyn TableConnector>) -> Self {
        Self {
            connector,
            backend: OnceCell::new(),
        }
    }

    pub async fn ensure_ready(&self) -> Result<&Arc<dyn TableBackend>, AppError> {
        self.backend
            .get_or_try_init(|| async {
                let backend = self.connector.connect().await.map_err(|e| {
                    tracing::error!(error = %e, "failed to connect conversation store");
                    AppError::StorageUnavailable(e.to_string())
                })?;
                backend.create_table_if_not_exists().await.map_err(|e| {
                    tracing::error!(error = %e, "failed to create conversation table");
                    AppError::StorageUnavailable(e.to_string())
                })?;
                tracing::info!("conversation store initialized");
                Ok(backend)
            })
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.backend.initialized()
    }
}

pub struct ReferenceStore {
    handle: ConnectionHandle,
}

impl ReferenceStore {
    pub fn new(connector: Arc<dyn TableConnector>) -> Self {
        Self {
            handle: ConnectionHandle::new(connector),
        }
    }

    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        self.handle.ensure_ready().await.map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Stores `reference`, replacing any earlier entry for the same
    /// conversation.
    pub async fn upsert(&self, reference: &ConversationReference) -> Result<(), AppError> {
        let backend = self.handle.ensure_ready().await?;
        let entity = TableEntity {
            partition_key: PARTITION.to_string(),
            row_key: reference.conversation_id().to_string(),
            reference: serde_json::to_string(reference)
                .map_err(|e| AppError::Internal(e.into()))?,
            timestamp: None,
        };

        backend
            .upsert_entity(&entity)
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        tracing::debug!(
            conversation_id = %reference.conversation_id(),
            "stored conversation reference"
        );
        Ok(())
    }

    /// Deletes the entry for `conversation_id`, if any.
    pub async fn remove(&self, conversation_id: &str) -> Result<bool, AppError> {
        let backend = self.handle.ensure_ready().await?;
        let removed = backend
            .delete_entity(PARTITION, conversation_id)
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        tracing::debug!(conversation_id, removed, "pruned conversation reference");
        Ok(removed)
    }

    /// Streams every stored reference.
    ///
    /// Each call starts a new scan. Entries that fail to decode, or rows the
    /// backend fails to read, are logged and skipped.
    pub async fn list_all(&self) -> Result<BoxStream<'_, ConversationReference>, AppError> {
        let backend = self.handle.ensure_ready().await?;

        let references = backend.list_entities(PARTITION).filter_map(|row| {
            let decoded = match row {
                Ok(entity) => match decode_entity(&entity) {
                    Ok(reference) => Some(reference),
                    Err(e) => {
                        tracing::warn!(
                            row_key = %entity.row_key,
                            written_at = ?entity.timestamp,
                            error = %e,
                            "skipping stored reference"
                        );
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stored reference");
                    None
                }
            };
            future::ready(decoded)
        });

        Ok(references.boxed())
    }
}

fn decode_entity(entity: &TableEntity) -> Result<ConversationReference, AppError> {
    serde_json::from_str(&entity.reference).map_err(|e| AppError::Decode(e.to_string()))
}
