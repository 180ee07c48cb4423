//! Error type definitions for the camera bridge

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transcoder could not be started
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Token or pairing-code rejection
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Bridge API failures that the caller has to know about
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Stop/status against a device without a live session
    #[error("Stream not running for device {device_id}")]
    NotRunning {
        device_id: String,
        last_error: Option<String>,
    },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while bringing a transcoder process up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    /// The configured executable does not exist
    #[error("Transcoder binary not found: {command}")]
    BinaryNotFound { command: String },

    /// Spawn failed, or the process exited non-zero during the startup grace window
    #[error("Failed to start transcoder: {message}")]
    LaunchFailed {
        message: String,
        diagnostic: Option<String>,
    },
}

/// Control-plane authentication failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid pairing code")]
    InvalidPairCode,
}

/// Bridge API failures
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// Connection refused, DNS failure, timeout
    #[error("{service} unreachable: {message}")]
    Unreachable { service: String, message: String },

    /// Upstream answered with a non-success status
    #[error("{service} returned HTTP {status}")]
    Status { service: String, status: u16 },

    #[error("{resource} not found in {service}")]
    NotFound { service: String, resource: String },

    /// Response body did not match the expected shape
    #[error("Unexpected response from {service}: {message}")]
    Decode { service: String, message: String },
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn not_running<S: Into<String>>(device_id: S) -> Self {
        Self::NotRunning {
            device_id: device_id.into(),
            last_error: None,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl LaunchError {
    pub fn launch_failed<S: Into<String>>(message: S) -> Self {
        Self::LaunchFailed {
            message: message.into(),
            diagnostic: None,
        }
    }
}

impl CollaboratorError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_errors_convert_into_app_error() {
        let err: AppError = LaunchError::BinaryNotFound {
            command: "ffmpeg".into(),
        }
        .into();
        assert!(matches!(err, AppError::Launch(LaunchError::BinaryNotFound { .. })));
        assert_eq!(
            err.to_string(),
            "Launch error: Transcoder binary not found: ffmpeg"
        );
    }

    #[test]
    fn only_unreachable_and_server_errors_are_transient() {
        let service = "bridge-api".to_string();
        assert!(
            CollaboratorError::Unreachable {
                service: service.clone(),
                message: "refused".into()
            }
            .is_transient()
        );
        assert!(
            CollaboratorError::Status {
                service: service.clone(),
                status: 503
            }
            .is_transient()
        );
        assert!(
            !CollaboratorError::Status {
                service: service.clone(),
                status: 422
            }
            .is_transient()
        );
        assert!(
            !CollaboratorError::NotFound {
                service,
                resource: "device cam-1".into()
            }
            .is_transient()
        );
    }
}
