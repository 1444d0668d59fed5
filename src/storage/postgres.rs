use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{
    count_query, insert_prefix, per_sender_query, DialogStore, SenderCount, StoredDialog,
    WRITE_CHUNK_ROWS,
};
use crate::config::PostgresCredentials;
use crate::error::BotResult;

/// PostgreSQL backend. Every call opens its own pool and closes it when done.
#[derive(Clone)]
pub struct PostgresStore {
    options: PgConnectOptions,
}

impl PostgresStore {
    pub fn new(credentials: &PostgresCredentials) -> Self {
        let options = PgConnectOptions::new()
            .host(&credentials.host)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&credentials.dbname);
        info!(
            "PostgreSQL store configured: {}@{}/{}",
            credentials.user, credentials.host, credentials.dbname
        );
        Self { options }
    }

    async fn pool(&self) -> BotResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(self.options.clone())
            .await?;
        Ok(pool)
    }

    async fn insert_chunks(pool: &PgPool, rows: &[StoredDialog]) -> BotResult<u64> {
        let mut tx = pool.begin().await?;
        let mut inserted = 0;
        for chunk in rows.chunks(WRITE_CHUNK_ROWS) {
            let done = insert_query(chunk).build().execute(&mut *tx).await?;
            inserted += done.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

/// One multi-row INSERT with every value bound.
fn insert_query(rows: &[StoredDialog]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(insert_prefix());
    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.sender_id)
            .push_bind(row.sender_name.clone())
            .push_bind(row.dialog.clone())
            .push_bind(row.need_to_process)
            .push_bind(row.extra.clone());
    });
    builder
}

#[async_trait]
impl DialogStore for PostgresStore {
    async fn write(&self, rows: &[StoredDialog]) -> BotResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let pool = self.pool().await?;
        let result = Self::insert_chunks(&pool, rows).await;
        pool.close().await;

        debug!("Inserted {} dialog row(s)", result?);
        Ok(())
    }

    async fn count_dialogs(&self) -> BotResult<i64> {
        let pool = self.pool().await?;
        let result = sqlx::query_scalar::<_, i64>(&count_query())
            .fetch_one(&pool)
            .await;
        pool.close().await;
        Ok(result?)
    }

    async fn dialogs_per_sender(&self) -> BotResult<Vec<SenderCount>> {
        let pool = self.pool().await?;
        let result = sqlx::query_as::<_, (Option<String>, i64)>(&per_sender_query())
            .fetch_all(&pool)
            .await;
        pool.close().await;

        Ok(result?
            .into_iter()
            .map(|(name, dialogs)| SenderCount {
                sender_name: name.unwrap_or_default(),
                dialogs,
            })
            .collect())
    }
}
