use axum::{extract::State, response::Json};
use serde_json::json;

use crate::errors::Result;
use crate::handlers::AppState;

pub async fn liveness() -> Result<Json<serde_json::Value>> {
    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn readiness(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(state.database.pool()).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let redis_status = match &state.redis {
        Some(redis) => match redis.ping().await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        None => "not_configured",
    };

    let overall_status = if db_status == "healthy" && redis_status != "unhealthy" {
        "ready"
    } else {
        "not_ready"
    };

    Ok(Json(json!({
        "status": overall_status,
        "checks": {
            "database": db_status,
            "redis": redis_status
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
