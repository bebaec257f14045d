use axum::Json;
use flock_shared::types::api::HealthResponse;

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy("flock-matching", env!("CARGO_PKG_VERSION")))
}
