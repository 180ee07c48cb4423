//! Stream session models
//!
//! Request/response bodies for the stream endpoints plus the lifecycle enums
//! shared by the supervisor and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::telemetry::TelemetrySample;

/// Session lifecycle: `starting -> running -> stopping -> terminated`, or `error`
/// when the transcoder dies on its own with a non-zero code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Stopping,
    Terminated,
    Error,
}

impl SessionState {
    /// Whether the transcoder is still expected to be alive
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
            Self::Error => "error",
        };
        f.write_str(value)
    }
}

/// Tag sent with every metrics push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
    Running,
    Idle,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    #[default]
    Rtsp,
    Mjpeg,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartStreamRequest {
    /// Source URL; resolved from the bridge API when omitted
    #[schema(example = "rtsp://192.168.1.20:554/stream1")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub protocol: StreamProtocol,
    /// Relay destinations, reported back with every metrics push
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamResponse {
    pub status: StartStatus,
    #[schema(example = "/stream/front-door/playlist")]
    pub playlist_ref: String,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopStreamResponse {
    pub status: StopStatus,
}

/// Point-in-time view of a session for status polling and listings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub device_id: String,
    pub session_id: Uuid,
    pub state: SessionState,
    pub running: bool,
    pub targets: Vec<String>,
    pub protocol: StreamProtocol,
    pub metrics: TelemetrySample,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub idle_seconds: u64,
    /// Milliseconds since the last progress line, `None` before the first one
    pub last_telemetry_age_ms: Option<u64>,
    /// Transcoder argv, binary first
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionEventKind {
    Started,
    Running,
    Stopped,
    Failed,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle notification relayed to `/events` subscribers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub device_id: String,
    pub session_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
