/// Health check endpoints
///
/// # Endpoints
///
/// ```text
/// GET /
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "todo-api",
///   "version": "0.1.0",
///   "database": "connected"
/// }
/// ```
///
/// The check always answers 200; a database that cannot be reached turns
/// `status` into `degraded`.

use crate::app::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use todo_shared::db::pool::health_check as database_health_check;

pub const SERVICE_NAME: &str = "todo-api";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    pub service: String,

    pub version: String,

    /// `connected` or `disconnected`
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub health: String,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Todo API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        health: "/health".to_string(),
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match database_health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
    })
}
