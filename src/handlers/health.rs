//! Health check handlers

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

#[derive(Serialize)]
pub struct RootResponse {
    name: &'static str,
    version: &'static str,
    status: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "CloudShield Monitoring API",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
