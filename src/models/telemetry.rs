use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One recognized field from a transcoder progress line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryUpdate {
    Frame(u64),
    Fps(f64),
    BitrateKbps(f64),
}

/// Latest telemetry folded from the progress channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    #[schema(example = 1200)]
    pub frame_count: u64,
    #[schema(example = 25.0)]
    pub fps: f64,
    #[schema(example = 1500.0)]
    pub bitrate_kbps: f64,
}

impl TelemetrySample {
    /// Fold one update into the snapshot. The frame counter never moves backwards.
    pub fn apply(&mut self, update: TelemetryUpdate) {
        match update {
            TelemetryUpdate::Frame(frame) => self.frame_count = self.frame_count.max(frame),
            TelemetryUpdate::Fps(fps) => self.fps = fps,
            TelemetryUpdate::BitrateKbps(kbps) => self.bitrate_kbps = kbps,
        }
    }
}
