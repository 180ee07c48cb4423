//! HTTP middleware: request logging and the bearer-token gate

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, Uri, header},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::AppState;
use super::responses::handle_error;
use crate::errors::AppError;

/// Query parameter accepted in place of the `Authorization` header
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Request logging middleware
///
/// Logs all incoming requests with timing information
pub async fn request_logging_middleware(
    method: Method,
    uri: Uri,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    // Never log the token
    let path = uri.path().to_string();

    debug!(
        method = %method,
        path = %path,
        request_id = %request_id,
        "HTTP request started"
    );

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration = start.elapsed();

    if status >= 400 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    response
}

/// Reject the request unless it carries a live token.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = bearer_token(request.headers()).or_else(|| query_token(request.uri()));
    match state.auth.validate(token.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(e) => handle_error(AppError::Auth(e)),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}

fn query_token(uri: &Uri) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == ACCESS_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
}
