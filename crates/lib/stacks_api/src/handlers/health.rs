//! Liveness probe.

use crate::extract::Json;
use crate::models::HealthResponse;

/// `GET|HEAD /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
