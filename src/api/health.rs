/// Health check endpoints
///
/// `/health` only proves the process answers; `/health/ready` also checks
/// the database.
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "ok" or "unavailable"
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_ms: Option<u64>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
}

pub async fn health_basic() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database_ms: None,
    })
}

/// Returns 503 when the database cannot be reached
pub async fn readiness_probe(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();

    match db::test_connection(&ctx.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "ok".to_string(),
                version: ctx.config.service.version.clone(),
                database_ms: Some(start.elapsed().as_millis() as u64),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unavailable".to_string(),
                    version: ctx.config.service.version.clone(),
                    database_ms: None,
                }),
            )
        }
    }
}
