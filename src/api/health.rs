use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    models::{endpoint::Endpoint, session::SessionStatus},
    utils::startup_utils::AppState,
};

pub const SERVICE_NAME: &str = "garmin-bridge";

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub session: SessionStatus,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    pub endpoints: Vec<String>,
}

/// Liveness only. Never logs in, so it stays 200 even when Garmin is down.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        session: state.session_manager.session_status().await,
    })
}

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        endpoints: Endpoint::ALL.iter().map(Endpoint::path).collect(),
    })
}
