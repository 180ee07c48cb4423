use axum::{Json, extract::State};

use crate::models::HealthResponse;
use crate::web::AppState;

/// Liveness plus a summary of what the supervisor is doing
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds()
        .max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime,
        active_session_count: state.supervisor.registry().len(),
        transcoder_available: state.supervisor.transcoder_available(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
