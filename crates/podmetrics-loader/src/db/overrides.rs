use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podmetrics_common::types::{Interval, Tier};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::LoaderResult;
use crate::ingest::overrides::OverrideSource;
use crate::ingest::types::OverrideEntry;

/// Reads `podcast_metrics_override` / `episode_metrics_override`.
#[derive(Clone)]
pub struct PgOverrideSource {
    pool: PgPool,
}

impl PgOverrideSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct OverrideRow {
    entity_id: Uuid,
    metrics_ts: DateTime<Utc>,
    metrics_category_cd: String,
    metrics_value: String,
    metrics_count: i64,
}

#[async_trait]
impl OverrideSource for PgOverrideSource {
    async fn overrides(
        &self,
        tier: Tier,
        interval: Interval,
        timestamp: DateTime<Utc>,
        category_code: &str,
    ) -> LoaderResult<Vec<OverrideEntry>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(&format!(
            r#"
            SELECT {id_column} AS entity_id,
                   metrics_ts,
                   metrics_category_cd::TEXT AS metrics_category_cd,
                   metrics_value,
                   metrics_count::BIGINT AS metrics_count
            FROM {table}
            WHERE metrics_interval::TEXT = $1
              AND metrics_ts = $2
              AND metrics_category_cd::TEXT = $3
            "#,
            id_column = tier.id_column(),
            table = tier.override_table(),
        ))
        .bind(interval.name())
        .bind(timestamp)
        .bind(category_code)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OverrideEntry {
                interval,
                entity_id: row.entity_id,
                timestamp: row.metrics_ts,
                category_code: row.metrics_category_cd,
                value: row.metrics_value,
                count: row.metrics_count,
            })
            .collect())
    }
}
