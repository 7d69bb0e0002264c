use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::table::{TableBackend, TableConnector, TableEntity};

/// Postgres-backed [`TableBackend`]. One table, composite primary key on
/// `(partition_key, row_key)`.
#[derive(Clone)]
pub struct PgTable {
    pool: PgPool,
    create_sql: String,
    upsert_sql: String,
    delete_sql: String,
    list_sql: String,
}

impl PgTable {
    pub fn new(pool: PgPool, table: &str) -> anyhow::Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            create_sql: format!(
                r#"CREATE TABLE IF NOT EXISTS {table} (
                       partition_key TEXT NOT NULL,
                       row_key       TEXT NOT NULL,
                       reference     TEXT NOT NULL,
                       updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                       PRIMARY KEY (partition_key, row_key)
                   )"#
            ),
            upsert_sql: format!(
                r#"INSERT INTO {table} (partition_key, row_key, reference, updated_at)
                   VALUES ($1, $2, $3, NOW())
                   ON CONFLICT (partition_key, row_key)
                   DO UPDATE SET reference = EXCLUDED.reference, updated_at = NOW()"#
            ),
            delete_sql: format!(
                "DELETE FROM {table} WHERE partition_key = $1 AND row_key = $2"
            ),
            list_sql: format!(
                "SELECT partition_key, row_key, reference, updated_at AS timestamp FROM {table} WHERE partition_key = $1"
            ),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TableBackend for PgTable {
    async fn create_table_if_not_exists(&self) -> anyhow::Result<()> {
        sqlx::query(&self.create_sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_entity(&self, entity: &TableEntity) -> anyhow::Result<()> {
        sqlx::query(&self.upsert_sql)
            .bind(&entity.partition_key)
            .bind(&entity.row_key)
            .bind(&entity.reference)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_entity(&self, partition_key: &str, row_key: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(&self.delete_sql)
            .bind(partition_key)
            .bind(row_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn list_entities<'a>(
        &'a self,
        partition_key: &str,
    ) -> BoxStream<'a, anyhow::Result<TableEntity>> {
        sqlx::query_as::<_, TableEntity>(&self.list_sql)
            .bind(partition_key.to_string())
            .fetch(&self.pool)
            .map(|row| row.map_err(anyhow::Error::from))
            .boxed()
    }
}

/// Connects a pool and wraps it in a [`PgTable`].
pub struct PgConnector {
    database_url: String,
    table: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl TableConnector for PgConnector {
    async fn connect(&self) -> anyhow::Result<Arc<dyn TableBackend>> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&self.database_url)
            .await?;
        let table: Arc<dyn TableBackend> = Arc::new(PgTable::new(pool, &self.table)?);
        Ok(table)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> anyhow::Result<()> {
    let valid = !table.is_empty()
        && table.len() <= 63
        && table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("invalid table name: {:?}", table);
    }
    Ok(())
}
