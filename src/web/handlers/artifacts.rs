//! HLS artifact serving
//!
//! Every successful or failed read against a live session counts as activity
//! for the idle reaper.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;

use crate::errors::AppError;
use crate::web::{AppState, handle_error};

/// Playlist (`playlist`) or segment bytes for a device
#[utoipa::path(
    get,
    path = "/stream/{device_id}/{artifact}",
    tag = "streams",
    params(
        ("device_id" = String, Path, description = "Camera device id"),
        ("artifact" = String, Path, description = "`playlist` or a segment file name")
    ),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 400, description = "Invalid artifact name"),
        (status = 404, description = "No session or no such artifact")
    ),
    security(("bearer" = []))
)]
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path((device_id, artifact)): Path<(String, String)>,
) -> Response {
    let path = match state.supervisor.resolve_artifact(&device_id, &artifact).await {
        Ok(path) => path,
        Err(e) => return handle_error(e),
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        // Segment rotated away between resolve and read
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return handle_error(AppError::not_found("artifact", artifact));
        }
        Err(e) => return handle_error(AppError::Io(e)),
    };

    let content_type = content_type_for(&path);
    let mut response = (StatusCode::OK, Body::from(bytes)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if content_type == PLAYLIST_CONTENT_TYPE {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }
    response
}

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

fn content_type_for(path: &FsPath) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => PLAYLIST_CONTENT_TYPE,
        Some("ts") => "video/mp2t",
        Some("m4s") | Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
