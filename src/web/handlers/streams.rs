//! Stream control and status

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use tracing::info;

use crate::models::{
    SessionStatus, StartStreamRequest, StartStreamResponse, StopStatus, StopStreamResponse,
};
use crate::web::{AppState, ValidatedJson, handle_error, handle_result};

/// Start transcoding for a device, or report the session already running
#[utoipa::path(
    post,
    path = "/devices/{device_id}/streams",
    tag = "streams",
    params(("device_id" = String, Path, description = "Camera device id")),
    request_body = StartStreamRequest,
    responses(
        (status = 200, description = "Session started or already running", body = StartStreamResponse),
        (status = 400, description = "Missing or unsupported source"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Transcoder failed during startup"),
        (status = 503, description = "Transcoder binary unavailable")
    ),
    security(("bearer" = []))
)]
pub async fn start_stream(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    ValidatedJson(request): ValidatedJson<StartStreamRequest>,
) -> Response {
    let result = state
        .supervisor
        .start_stream(&device_id, request)
        .await
        .map(|started| StartStreamResponse {
            status: started.status,
            playlist_ref: format!("/stream/{device_id}/playlist"),
            session_id: started.session.id(),
        });
    handle_result(result)
}

/// Stop the device's session and wait until it is gone
#[utoipa::path(
    delete,
    path = "/devices/{device_id}/streams",
    tag = "streams",
    params(("device_id" = String, Path, description = "Camera device id")),
    responses(
        (status = 200, description = "Session stopped", body = StopStreamResponse),
        (status = 404, description = "No session for this device")
    ),
    security(("bearer" = []))
)]
pub async fn stop_stream(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    match state.supervisor.stop_stream(&device_id).await {
        Ok(()) => {
            info!(device_id = %device_id, "Stream stopped via API");
            handle_result(Ok(StopStreamResponse {
                status: StopStatus::Stopped,
            }))
        }
        Err(e) => handle_error(e),
    }
}

/// Live status of the device's session
#[utoipa::path(
    get,
    path = "/devices/{device_id}/status",
    tag = "streams",
    params(("device_id" = String, Path, description = "Camera device id")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionStatus),
        (status = 404, description = "No session; details.lastError holds the last failure")
    ),
    security(("bearer" = []))
)]
pub async fn device_status(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    handle_result(state.supervisor.status(&device_id))
}

/// All registered sessions, ordered by device id
#[utoipa::path(
    get,
    path = "/devices",
    tag = "streams",
    responses((status = 200, description = "Session snapshots", body = [SessionStatus])),
    security(("bearer" = []))
)]
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionStatus>> {
    Json(state.supervisor.list_sessions())
}
