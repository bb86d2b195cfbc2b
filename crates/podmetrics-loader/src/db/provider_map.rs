use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::LoaderResult;
use crate::ingest::resolver::ProviderMapping;

/// Lookups against `data_provider_map`
#[derive(Clone)]
pub struct PgProviderMapping {
    pool: PgPool,
}

impl PgProviderMapping {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderMapping for PgProviderMapping {
    async fn internal_id(
        &self,
        provider_code: &str,
        provider_id: &str,
        data_category: &str,
    ) -> LoaderResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT internal_id
            FROM data_provider_map
            WHERE provider_code = $1
              AND provider_id = $2
              AND data_category = $3
            LIMIT 1
            "#,
        )
        .bind(provider_code)
        .bind(provider_id)
        .bind(data_category)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}
