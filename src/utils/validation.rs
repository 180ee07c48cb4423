//! Input validation for path-bound identifiers
//!
//! Device ids and artifact names end up as path components under the output
//! root, so both are restricted to a conservative character set.

use thiserror::Error;

pub const MAX_DEVICE_ID_LENGTH: usize = 64;
pub const MAX_ARTIFACT_NAME_LENGTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' must be at most {max} characters long (got {actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' contains characters outside {allowed}")]
    InvalidCharacters { field: String, allowed: String },
}

/// `[A-Za-z0-9_-]{1,64}`
pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    validate_component(device_id, "deviceId", MAX_DEVICE_ID_LENGTH, "[A-Za-z0-9_-]", |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
}

/// A single file name inside a session directory: `[A-Za-z0-9._-]`, no `..`.
pub fn validate_artifact_name(name: &str) -> Result<(), ValidationError> {
    validate_component(name, "segment", MAX_ARTIFACT_NAME_LENGTH, "[A-Za-z0-9._-]", |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
    })?;
    if name.starts_with('.') {
        return Err(ValidationError::InvalidCharacters {
            field: "segment".to_string(),
            allowed: "names not starting with '.'".to_string(),
        });
    }
    Ok(())
}

fn validate_component(
    value: &str,
    field: &str,
    max: usize,
    allowed: &str,
    is_allowed: impl Fn(char) -> bool,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual: value.len(),
        });
    }
    if !value.chars().all(is_allowed) {
        return Err(ValidationError::InvalidCharacters {
            field: field.to_string(),
            allowed: allowed.to_string(),
        });
    }
    Ok(())
}
