use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::build_pool;
use crate::repository::reference::LatestIndex;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    /// Latest published inflation index per index type. Index rows change
    /// monthly, so a short TTL keeps adjustment runs off the reference table.
    pub index_cache: Cache<String, Option<LatestIndex>>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config);
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set — billing operations will fail until configured");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.document_render_timeout_seconds))
            .build()?;

        let index_cache = Cache::builder()
            .max_capacity(config.index_cache_max_entries)
            .time_to_live(Duration::from_secs(config.index_cache_ttl_seconds))
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            http_client,
            index_cache,
        })
    }
}
