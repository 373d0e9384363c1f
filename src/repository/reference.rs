use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{map_db_error, AppResult};
use crate::state::AppState;

/// Most recently published row of an inflation-index series.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LatestIndex {
    pub index_type: String,
    pub period_date: NaiveDate,
    pub variation_monthly: Option<Decimal>,
}

pub async fn find_latest_index(pool: &PgPool, series: &str) -> AppResult<Option<LatestIndex>> {
    sqlx::query_as::<_, LatestIndex>(
        "SELECT index_type, period_date, variation_monthly
         FROM inflation_indices
         WHERE index_type = $1
         ORDER BY period_date DESC
         LIMIT 1",
    )
    .bind(series)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)
}

/// Cached lookup: index series publish monthly, so the per-series TTL cache
/// keeps adjustment runs from hammering the reference table.
pub async fn find_latest_index_cached(
    state: &AppState,
    pool: &PgPool,
    series: &str,
) -> AppResult<Option<LatestIndex>> {
    if let Some(cached) = state.index_cache.get(series).await {
        return Ok(cached);
    }
    let latest = find_latest_index(pool, series).await?;
    state
        .index_cache
        .insert(series.to_string(), latest.clone())
        .await;
    Ok(latest)
}

/// Register a rendered document. Rendering itself happens in the external
/// collaborator; only the resulting storage key is recorded.
pub async fn insert_document(
    pool: &PgPool,
    entity_type: &str,
    entity_id: Uuid,
    storage_key: &str,
    mime_type: &str,
    size_bytes: Option<i64>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO documents (entity_type, entity_id, storage_key, mime_type, size_bytes)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(entity_type)
    .bind(entity_id)
    .bind(storage_key)
    .bind(mime_type)
    .bind(size_bytes)
    .execute(pool)
    .await
    .map_err(map_db_error)?;
    Ok(())
}
