use sqlx::PgPool;
use tracing::info;

use crate::error::LoaderResult;
use crate::ingest::normalize::GeoTables;

/// Load the DMA (`dma_regions`) and country (`countries`) reference tables.
pub async fn load_geo_tables(pool: &PgPool) -> LoaderResult<GeoTables> {
    let dma: Vec<(String, String)> =
        sqlx::query_as("SELECT dma_code::TEXT, dma_name FROM dma_regions")
            .fetch_all(pool)
            .await?;

    let countries: Vec<(String, String)> =
        sqlx::query_as("SELECT alpha2, name FROM countries")
            .fetch_all(pool)
            .await?;

    let tables = GeoTables::from_pairs(dma, countries);
    info!(
        dma_regions = tables.dma_count(),
        countries = tables.country_count(),
        "Loaded geographic reference tables"
    );
    Ok(tables)
}
