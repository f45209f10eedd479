use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;

/// Lazily connecting pool, or `None` when no database is configured so the
/// service can still boot and answer health checks.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL is not set; database-backed routes will return 502");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(url)?;

    Ok(Some(pool))
}
