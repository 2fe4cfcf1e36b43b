use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::services::health_monitor::HealthReport;
use crate::services::HealthMonitor;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Liveness of the gateway itself.
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Latest result of the backend health poll.
pub async fn backend_health(State(monitor): State<Arc<HealthMonitor>>) -> Json<HealthReport> {
    Json(monitor.report())
}

pub async fn refresh_backend_health(
    State(monitor): State<Arc<HealthMonitor>>,
) -> (StatusCode, Json<HealthReport>) {
    monitor.refresh();
    (StatusCode::ACCEPTED, Json(monitor.report()))
}
