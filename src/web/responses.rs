//! HTTP response types and utilities
//!
//! Successful calls return their payload as-is. Every failure goes through
//! [`handle_error`] and comes back in the [`ApiResponse`] envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult, CollaboratorError, LaunchError};

/// Error envelope. Successful calls answer with their payload directly.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    /// Always `false` for errors
    pub success: bool,
    pub error: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiResponse {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            error: message,
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error_with_details(message: String, details: HashMap<String, String>) -> Self {
        Self {
            details: Some(details),
            ..Self::error(message)
        }
    }
}

/// Serialize `result` as a bare JSON payload or the error envelope
pub fn handle_result<T>(result: AppResult<T>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(error) => handle_error(error),
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message, details) = match &error {
        AppError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone(), None),
        AppError::Auth(auth) => (StatusCode::UNAUTHORIZED, auth.to_string(), None),
        AppError::NotRunning {
            device_id,
            last_error,
        } => (
            StatusCode::NOT_FOUND,
            format!("Stream not running for device {device_id}"),
            last_error
                .as_ref()
                .map(|e| HashMap::from([("lastError".to_string(), e.clone())])),
        ),
        AppError::NotFound { resource, id } => (
            StatusCode::NOT_FOUND,
            format!("{} '{}' not found", resource, id),
            None,
        ),
        AppError::Launch(LaunchError::BinaryNotFound { command }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Transcoder binary '{command}' is not available"),
            None,
        ),
        AppError::Launch(LaunchError::LaunchFailed {
            message,
            diagnostic,
        }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            message.clone(),
            diagnostic
                .as_ref()
                .map(|d| HashMap::from([("diagnostic".to_string(), d.clone())])),
        ),
        AppError::Collaborator(CollaboratorError::NotFound { resource, .. }) => (
            StatusCode::NOT_FOUND,
            format!("{resource} not found"),
            None,
        ),
        AppError::Collaborator(other) => (StatusCode::BAD_GATEWAY, other.to_string(), None),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Configuration error: {}", message),
            None,
        ),
        AppError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", message),
            None,
        ),
        AppError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "I/O operation failed".to_string(),
            None,
        ),
    };

    if status.is_server_error() {
        error!("Request failed with {}: {}", status, error);
    } else if status != StatusCode::NOT_FOUND {
        warn!("Request rejected with {}: {}", status, error);
    }

    let response = match details {
        Some(details) => ApiResponse::error_with_details(message, details),
        None => ApiResponse::error(message),
    };

    (status, Json(response)).into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error(message.to_string())),
    )
        .into_response()
}
