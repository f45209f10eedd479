use std::time::Duration;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::state::AppState;

const DB_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db = match &state.db_pool {
        Some(pool) => ping_database(pool).await,
        None => "not_configured",
    };

    let status = if db == "unreachable" { "degraded" } else { "ok" };
    Json(json!({
        "status": status,
        "app": state.config.app_name,
        "environment": state.config.environment,
        "now": Utc::now().to_rfc3339(),
        "db": db,
    }))
}

/// Bounded `SELECT 1` so the health check answers even while the first connect hangs.
async fn ping_database(pool: &PgPool) -> &'static str {
    match tokio::time::timeout(DB_PROBE_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => "ok",
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Health check query failed");
            "unreachable"
        }
        Err(_) => {
            tracing::error!(timeout_secs = DB_PROBE_TIMEOUT.as_secs(), "Health check query timed out");
            "unreachable"
        }
    }
}
