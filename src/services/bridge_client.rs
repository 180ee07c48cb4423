//! Outbound calls to the bridge API
//!
//! The supervisor talks to the bridge API through [`StatusReporter`]. Only
//! `fetch_device` reports failures back; metric pushes and offline
//! notifications are fire-and-forget with bounded retries.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::errors::{AppError, AppResult, CollaboratorError, CollaboratorResult};
use crate::models::{DeviceRecord, MetricsReport, OfflineNotice};

const SERVICE_NAME: &str = "bridge-api";

#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Whether a bridge API is configured at all
    fn is_configured(&self) -> bool;

    /// `GET /devices/{id}`
    async fn fetch_device(&self, device_id: &str) -> CollaboratorResult<DeviceRecord>;

    /// `POST /devices/{id}/metrics`, best effort
    async fn push_metrics(&self, device_id: &str, report: &MetricsReport);

    /// `POST /webhooks/device-offline`, best effort
    async fn notify_offline(&self, notice: &OfflineNotice);
}

/// Reporter used when no bridge API is configured
pub struct DisabledReporter;

#[async_trait]
impl StatusReporter for DisabledReporter {
    fn is_configured(&self) -> bool {
        false
    }

    async fn fetch_device(&self, device_id: &str) -> CollaboratorResult<DeviceRecord> {
        Err(CollaboratorError::NotFound {
            service: SERVICE_NAME.to_string(),
            resource: format!("device {device_id}"),
        })
    }

    async fn push_metrics(&self, device_id: &str, report: &MetricsReport) {
        debug!(
            device_id,
            ingest_state = ?report.ingest_state,
            "No bridge API configured, dropping metrics"
        );
    }

    async fn notify_offline(&self, notice: &OfflineNotice) {
        debug!(
            device_id = %notice.device_id,
            "No bridge API configured, dropping offline notification"
        );
    }
}

/// reqwest-backed bridge API client
pub struct BridgeApiClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl BridgeApiClient {
    pub fn new(base_url: &str, config: &BridgeConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> CollaboratorResult<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(unreachable)?;
        check_status(response.status(), path)
    }

    /// POST with linear backoff on transient failures. Errors are logged, never returned.
    async fn post_with_retry<T: Serialize + Sync>(&self, path: &str, body: &T) {
        let mut attempt = 0;
        loop {
            match self.post_json(path, body).await {
                Ok(()) => return,
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!("POST {} failed ({}), retry {}/{}", path, e, attempt, self.max_retries);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    warn!("POST {} failed: {}", path, e);
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl StatusReporter for BridgeApiClient {
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_device(&self, device_id: &str) -> CollaboratorResult<DeviceRecord> {
        let path = format!("/devices/{device_id}");
        let response = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(unreachable)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound {
                service: SERVICE_NAME.to_string(),
                resource: format!("device {device_id}"),
            });
        }
        check_status(response.status(), &path)?;

        response
            .json::<DeviceRecord>()
            .await
            .map_err(|e| CollaboratorError::Decode {
                service: SERVICE_NAME.to_string(),
                message: e.to_string(),
            })
    }

    async fn push_metrics(&self, device_id: &str, report: &MetricsReport) {
        self.post_with_retry(&format!("/devices/{device_id}/metrics"), report)
            .await;
    }

    async fn notify_offline(&self, notice: &OfflineNotice) {
        self.post_with_retry("/webhooks/device-offline", notice).await;
    }
}

fn unreachable(error: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Unreachable {
        service: SERVICE_NAME.to_string(),
        message: error.to_string(),
    }
}

fn check_status(status: StatusCode, path: &str) -> CollaboratorResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        debug!("{} {} answered {}", SERVICE_NAME, path, status);
        Err(CollaboratorError::Status {
            service: SERVICE_NAME.to_string(),
            status: status.as_u16(),
        })
    }
}
