pub mod auth;
pub mod bridge;
pub mod session;
pub mod telemetry;

pub use auth::*;
pub use bridge::*;
pub use session::*;
pub use telemetry::*;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    /// Seconds since the service started
    pub uptime: u64,
    pub active_session_count: usize,
    pub transcoder_available: bool,
    pub version: String,
}
