//! Payloads exchanged with the bridge API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::IngestState;

/// Subset of `GET /devices/{id}` the supervisor cares about
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub credentials: Option<DeviceCredentials>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredentials {
    #[serde(default)]
    pub rtsp_url: Option<String>,
}

impl DeviceRecord {
    pub fn rtsp_url(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .and_then(|c| c.rtsp_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }
}

/// Body of `POST /devices/{id}/metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub fps: f64,
    pub bitrate_kbps: f64,
    pub frame_count: u64,
    pub targets: Vec<String>,
    pub ingest_state: IngestState,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Body of `POST /webhooks/device-offline`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineNotice {
    pub device_id: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_record_ignores_extra_fields() {
        let record: DeviceRecord = serde_json::from_str(
            r#"{"id":"cam-1","name":"Porch","credentials":{"rtspUrl":"rtsp://u:p@cam/1","username":"u"}}"#,
        )
        .unwrap();
        assert_eq!(record.rtsp_url(), Some("rtsp://u:p@cam/1"));
    }

    #[test]
    fn blank_rtsp_url_counts_as_missing() {
        let record: DeviceRecord =
            serde_json::from_str(r#"{"credentials":{"rtspUrl":"  "}}"#).unwrap();
        assert_eq!(record.rtsp_url(), None);
        assert_eq!(DeviceRecord::default().rtsp_url(), None);
    }
}
