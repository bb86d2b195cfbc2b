//! Postgres staging tables
//!
//! Each store is a `TEMPORARY` table on its own connection, detached from the
//! pool: the table is only visible to that session and disappears with it, so a
//! crashed run cannot leave one behind. A session-level advisory lock on the
//! table name keeps concurrent runs for the same (metric type, day) apart.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use podmetrics_common::types::MetricType;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Connection, FromRow, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LoaderError, LoaderResult};
use crate::ingest::staging::{staging_table_name, StagingBackend, StagingStore};
use crate::ingest::types::{coalesce, MergeMode, PageCursor, StagingEntry};

/// Postgres caps a statement at 65535 bind parameters; five per row.
const MAX_ROWS_PER_STATEMENT: usize = 10_000;

#[derive(Clone)]
pub struct PgStagingBackend {
    pool: PgPool,
}

impl PgStagingBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StagingBackend for PgStagingBackend {
    async fn create(
        &self,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<Box<dyn StagingStore>> {
        let name = staging_table_name(metric_type, day);
        let mut conn = self.pool.acquire().await?.detach();

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(&name)
            .fetch_one(&mut conn)
            .await?;
        if !locked {
            conn.close().await?;
            return Err(LoaderError::StagingConflict(name));
        }

        info!("Creating staging table {}", name);
        sqlx::query(&format!(
            r#"
            CREATE TEMPORARY TABLE {name} (
                internal_id UUID NOT NULL,
                metrics_ts TIMESTAMPTZ NOT NULL,
                metrics_category_cd TEXT NOT NULL,
                metrics_value TEXT COLLATE "C" NOT NULL,
                metrics_count BIGINT NOT NULL,
                PRIMARY KEY (internal_id, metrics_ts, metrics_category_cd, metrics_value)
            )
            "#
        ))
        .execute(&mut conn)
        .await?;

        Ok(Box::new(PgStagingStore { name, conn }))
    }
}

pub struct PgStagingStore {
    name: String,
    conn: PgConnection,
}

#[derive(FromRow)]
struct StagingRow {
    internal_id: Uuid,
    metrics_ts: DateTime<Utc>,
    metrics_category_cd: String,
    metrics_value: String,
    metrics_count: i64,
}

impl From<StagingRow> for StagingEntry {
    fn from(row: StagingRow) -> Self {
        StagingEntry {
            entity_id: row.internal_id,
            timestamp: row.metrics_ts,
            category_code: row.metrics_category_cd,
            value: row.metrics_value,
            count: row.metrics_count,
        }
    }
}

impl PgStagingStore {
    async fn merge(&mut self, batch: &[StagingEntry], mode: MergeMode) -> LoaderResult<()> {
        let rows = coalesce(batch, mode)?;

        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (internal_id, metrics_ts, metrics_category_cd, metrics_value, metrics_count) ",
                self.name
            ));

            query_builder.push_values(chunk, |mut b, entry| {
                b.push_bind(entry.entity_id)
                    .push_bind(entry.timestamp)
                    .push_bind(&entry.category_code)
                    .push_bind(&entry.value)
                    .push_bind(entry.count);
            });

            query_builder.push(
                " ON CONFLICT (internal_id, metrics_ts, metrics_category_cd, metrics_value) \
                 DO UPDATE SET metrics_count = ",
            );
            match mode {
                MergeMode::Add => query_builder.push(format!(
                    "{}.metrics_count + EXCLUDED.metrics_count",
                    self.name
                )),
                MergeMode::Replace => query_builder.push("EXCLUDED.metrics_count"),
            };

            query_builder.build().execute(&mut self.conn).await?;
        }

        debug!("Merged {} rows into {} ({:?})", rows.len(), self.name, mode);
        Ok(())
    }
}

#[async_trait]
impl StagingStore for PgStagingStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn merge_add(&mut self, batch: &[StagingEntry]) -> LoaderResult<()> {
        self.merge(batch, MergeMode::Add).await
    }

    async fn merge_replace(&mut self, batch: &[StagingEntry]) -> LoaderResult<()> {
        self.merge(batch, MergeMode::Replace).await
    }

    async fn page_after(
        &mut self,
        cursor: Option<&PageCursor>,
        limit: usize,
    ) -> LoaderResult<Vec<StagingEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<StagingRow> = match cursor {
            None => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT internal_id, metrics_ts, metrics_category_cd, metrics_value, metrics_count
                    FROM {}
                    ORDER BY internal_id, metrics_ts, metrics_value
                    LIMIT $1
                    "#,
                    self.name
                ))
                .bind(limit)
                .fetch_all(&mut self.conn)
                .await?
            }
            Some(cursor) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT internal_id, metrics_ts, metrics_category_cd, metrics_value, metrics_count
                    FROM {}
                    WHERE (internal_id, metrics_ts, metrics_value) > ($1, $2, $3)
                    ORDER BY internal_id, metrics_ts, metrics_value
                    LIMIT $4
                    "#,
                    self.name
                ))
                .bind(cursor.entity_id)
                .bind(cursor.timestamp)
                .bind(&cursor.value)
                .bind(limit)
                .fetch_all(&mut self.conn)
                .await?
            }
        };

        Ok(rows.into_iter().map(StagingEntry::from).collect())
    }

    async fn clear(&mut self) -> LoaderResult<()> {
        sqlx::query(&format!("TRUNCATE {}", self.name))
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn destroy(self: Box<Self>) -> LoaderResult<()> {
        let PgStagingStore { name, mut conn } = *self;
        info!("Dropping staging table {}", name);

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", name))
            .execute(&mut conn)
            .await?;
        // closing the session releases the advisory lock
        conn.close().await?;
        Ok(())
    }
}
