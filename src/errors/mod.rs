//! Centralized error handling for the camera bridge
//!
//! # Error Categories
//!
//! - **Launch Errors**: the transcoder binary is missing, could not be spawned,
//!   or exited non-zero inside the startup grace window. Returned synchronously
//!   to the start request; the session is never registered.
//! - **Auth Errors**: missing, expired or mismatched bearer tokens and pairing
//!   codes. Rejected at the gateway boundary.
//! - **Collaborator Errors**: the bridge API could not be reached or answered
//!   badly. Only credential resolution propagates these; metric pushes and
//!   offline notifications log and swallow them.
//! - **Validation / NotRunning / NotFound**: request-level failures.
//!
//! A transcoder that dies after it was running is not an error value at all:
//! it becomes the session's `last_error` text and an `error` state.
//!
//! # Usage
//!
//! ```rust
//! use camera_bridge::errors::{AppError, AppResult};
//!
//! fn require_source(source: Option<&str>) -> AppResult<&str> {
//!     source.ok_or_else(|| AppError::validation("sourceUrl is required"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result alias for calls against the bridge API
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
