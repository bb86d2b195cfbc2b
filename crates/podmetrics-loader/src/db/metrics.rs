//! Permanent `(tier, interval)` metric tables

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podmetrics_common::types::MetricType;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::LoaderResult;
use crate::ingest::compactor::MetricSink;
use crate::ingest::types::StagingEntry;

/// Seven bind parameters per row, under the 65535 Postgres limit.
const MAX_ROWS_PER_STATEMENT: usize = 9_000;

#[derive(Clone)]
pub struct PgMetricSink {
    pool: PgPool,
}

impl PgMetricSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricSink for PgMetricSink {
    async fn upsert(
        &self,
        metric_type: MetricType,
        rows: &[StagingEntry],
        merged_at: DateTime<Utc>,
    ) -> LoaderResult<u64> {
        let table = metric_type.permanent_table();
        let id_column = metric_type.tier().id_column();

        let mut upserted = 0;
        for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {table} ({id_column}, metrics_ts, metrics_category_cd, metrics_value, \
                 metrics_count, created_at, updated_at) "
            ));

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.entity_id)
                    .push_bind(row.timestamp)
                    .push_bind(&row.category_code)
                    .push_bind(&row.value)
                    .push_bind(row.count)
                    .push_bind(merged_at)
                    .push_bind(merged_at);
            });

            query_builder.push(format!(
                " ON CONFLICT ({id_column}, metrics_ts, metrics_category_cd, metrics_value) \
                 DO UPDATE SET metrics_count = EXCLUDED.metrics_count, updated_at = EXCLUDED.updated_at"
            ));

            upserted += query_builder.build().execute(&self.pool).await?.rows_affected();
        }

        debug!("Upserted {} rows into {}", upserted, table);
        Ok(upserted)
    }
}
