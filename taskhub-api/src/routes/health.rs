/// Liveness and diagnostics
///
/// ```text
/// GET /health
/// GET /api/diagnostic
/// ```
///
/// Both are public and answer 200 even when the database is down, so load
/// balancers can tell "process up" from "dependency down".

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_shared::db::{
    migrations::{get_migration_status, MigrationStatus},
    pool::{get_pool_stats, health_check as db_health_check, PoolStats},
};

use crate::{app::AppState, response::ApiResponse};

pub const SERVICE_NAME: &str = "taskhub-api";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub version: String,
    /// `connected` or `disconnected`
    pub database: String,
}

#[derive(Debug, Serialize)]
pub struct Diagnostic {
    pub service: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub database: String,
    pub migrations: Option<MigrationStatus>,
    pub pool: PoolStats,
    pub server_time: DateTime<Utc>,
}

async fn database_status(state: &AppState) -> &'static str {
    match db_health_check(&state.db).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "disconnected"
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = database_status(&state).await;

    Json(HealthResponse {
        status: if database == "connected" { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    })
}

pub async fn diagnostic(State(state): State<AppState>) -> ApiResponse<Diagnostic> {
    let database = database_status(&state).await;
    let migrations = if database == "connected" {
        get_migration_status(&state.db).await.ok()
    } else {
        None
    };

    ApiResponse::ok(
        "Diagnostic",
        Diagnostic {
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            environment: state.config.api.environment.as_str(),
            database: database.to_string(),
            migrations,
            pool: get_pool_stats(&state.db),
            server_time: Utc::now(),
        },
    )
}
