//! Partitioned key/value table abstraction backing the conversation registry.
//!
//! Entities are addressed by `(partition_key, row_key)` and carry one opaque
//! text payload. Writes are upserts; listing is a lazy stream per partition.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub reference: String,
    /// Last write, stamped by the backend. Ignored on upsert.
    pub timestamp: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Creates the table if it does not exist yet. Idempotent.
    async fn create_table_if_not_exists(&self) -> anyhow::Result<()>;

    /// Inserts or fully replaces the entity at its key.
    async fn upsert_entity(&self, entity: &TableEntity) -> anyhow::Result<()>;

    /// Removes one entity. Returns whether anything was deleted.
    async fn delete_entity(&self, partition_key: &str, row_key: &str) -> anyhow::Result<bool>;

    /// Streams every entity in one partition. Each call starts a fresh scan.
    fn list_entities<'a>(&'a self, partition_key: &str)
        -> BoxStream<'a, anyhow::Result<TableEntity>>;
}

/// Opens a connection to a table backend. Called lazily, and again after a
/// failed attempt.
#[async_trait]
pub trait TableConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Arc<dyn TableBackend>>;
}

/// In-process table, used for local development and tests.
#[derive(Default)]
pub struct MemoryTable {
    rows: DashMap<(String, String), (String, DateTime<Utc>)>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl TableBackend for MemoryTable {
    async fn create_table_if_not_exists(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn upsert_entity(&self, entity: &TableEntity) -> anyhow::Result<()> {
        self.rows.insert(
            (entity.partition_key.clone(), entity.row_key.clone()),
            (entity.reference.clone(), Utc::now()),
        );
        Ok(())
    }

    async fn delete_entity(&self, partition_key: &str, row_key: &str) -> anyhow::Result<bool> {
        Ok(self
            .rows
            .remove(&(partition_key.to_string(), row_key.to_string()))
            .is_some())
    }

    fn list_entities<'a>(
        &'a self,
        partition_key: &str,
    ) -> BoxStream<'a, anyhow::Result<TableEntity>> {
        // Snapshot so no shard lock is held across await points.
        let rows: Vec<_> = self
            .rows
            .iter()
            .filter(|e| e.key().0 == partition_key)
            .map(|e| {
                Ok(TableEntity {
                    partition_key: e.key().0.clone(),
                    row_key: e.key().1.clone(),
                    reference: e.value().0.clone(),
                    timestamp: Some(e.value().1),
                })
            })
            .collect();
        stream::iter(rows).boxed()
    }
}

/// Hands out a shared [`MemoryTable`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    table: Arc<MemoryTable>,
}

impl MemoryConnector {
    pub fn new(table: Arc<MemoryTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> Arc<MemoryTable> {
        self.table.clone()
    }
}

#[async_trait]
impl TableConnector for MemoryConnector {
    async fn connect(&self) -> anyhow::Result<Arc<dyn TableBackend>> {
        let table: Arc<dyn TableBackend> = self.table.clone();
        Ok(table)
    }
}
