use std::sync::Arc;

use sqlx::PgPool;

use crate::{config::AppConfig, db::build_pool, error::AppError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = build_pool(&config)?;
        Ok(Self {
            config: Arc::new(config),
            db_pool,
        })
    }

    pub fn db_pool(&self) -> Result<&PgPool, AppError> {
        self.db_pool.as_ref().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })
    }
}
