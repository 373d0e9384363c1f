use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::AppConfig;

/// Build a lazily-connecting pool from the configured DATABASE_URL.
/// Returns None when no database is configured; callers surface that as a
/// Dependency error at request time rather than failing boot.
pub fn build_pool(config: &AppConfig) -> Option<PgPool> {
    let url = config.database_url.as_deref()?;
    let options = match PgConnectOptions::from_str(url) {
        Ok(options) => options,
        Err(error) => {
            tracing::error!(error = %error, "Invalid DATABASE_URL; starting without a database");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections)
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy_with(options);

    Some(pool)
}
