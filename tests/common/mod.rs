//! Shared fixtures for the HTTP-level tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use camera_bridge::{
    config::{CorsConfig, SupervisorConfig, TranscoderConfig},
    errors::{CollaboratorError, CollaboratorResult},
    models::{DeviceCredentials, DeviceRecord, MetricsReport, OfflineNotice},
    services::{AuthStore, SessionRegistry, StatusReporter, StreamSupervisor},
    web::{AppState, create_router},
};

/// Fake transcoder: writes a playlist and a segment next to its last argument
/// and prints progress blocks until SIGTERM.
pub const STREAMING_TRANSCODER: &str = r#"for arg in "$@"; do playlist="$arg"; done
dir=$(dirname "$playlist")
mkdir -p "$dir"
trap 'exit 0' TERM
n=0
while true; do
  n=$((n + 25))
  echo "segment" > "$dir/segment0.ts"
  printf '#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nsegment0.ts\n' > "$playlist"
  printf 'frame=%d\nfps=25.0\nbitrate=1500.0kbits/s\nprogress=continue\n' "$n"
  sleep 0.2
done
"#;

/// Runs long enough to pass startup, then dies with an error
pub const CRASHING_TRANSCODER: &str = r#"printf 'frame=10\nfps=25.0\nprogress=continue\n'
sleep 0.6
echo 'rtsp://10.0.0.2/live: Input/output error' >&2
exit 1
"#;

/// Fails before the startup grace elapses
pub const FAILING_TRANSCODER: &str = r#"echo 'rtsp://10.0.0.2/live: Connection refused' >&2
exit 1
"#;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Metrics(String, MetricsReport),
    Offline(OfflineNotice),
}

/// `StatusReporter` that keeps every call in memory, optionally answering slowly
#[derive(Default)]
pub struct RecordingReporter {
    pub devices: HashMap<String, String>,
    pub calls: Mutex<Vec<Recorded>>,
    pub delay: Duration,
}

impl RecordingReporter {
    pub fn with_device(device_id: &str, rtsp_url: &str) -> Self {
        Self {
            devices: HashMap::from([(device_id.to_string(), rtsp_url.to_string())]),
            ..Self::default()
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn offline_notices(&self) -> Vec<OfflineNotice> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Recorded::Offline(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn metrics_for(&self, device_id: &str) -> Vec<MetricsReport> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Recorded::Metrics(id, report) if id == device_id => Some(report),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    fn is_configured(&self) -> bool {
        !self.devices.is_empty()
    }

    async fn fetch_device(&self, device_id: &str) -> CollaboratorResult<DeviceRecord> {
        match self.devices.get(device_id) {
            Some(url) => Ok(DeviceRecord {
                credentials: Some(DeviceCredentials {
                    rtsp_url: Some(url.clone()),
                }),
            }),
            None => Err(CollaboratorError::NotFound {
                service: "bridge-api".to_string(),
                resource: format!("device {device_id}"),
            }),
        }
    }

    async fn push_metrics(&self, device_id: &str, report: &MetricsReport) {
        tokio::time::sleep(self.delay).await;
        self.calls
            .lock()
            .unwrap()
            .push(Recorded::Metrics(device_id.to_string(), report.clone()));
    }

    async fn notify_offline(&self, notice: &OfflineNotice) {
        tokio::time::sleep(self.delay).await;
        self.calls
            .lock()
            .unwrap()
            .push(Recorded::Offline(notice.clone()));
    }
}

pub struct TestApp {
    pub router: Router,
    pub supervisor: Arc<StreamSupervisor>,
    pub auth: Arc<AuthStore>,
    pub reporter: Arc<RecordingReporter>,
    pub dir: TempDir,
}

pub fn write_script(dir: &Path, body: &str) -> String {
    let path = dir.join("transcoder.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

pub fn spawn_app(script_body: &str) -> TestApp {
    spawn_app_with(script_body, RecordingReporter::default(), CorsConfig::default())
}

pub fn spawn_app_with(script_body: &str, reporter: RecordingReporter, cors: CorsConfig) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let command = write_script(dir.path(), script_body);
    spawn_app_with_command(dir, command, reporter, cors)
}

pub fn spawn_app_with_command(
    dir: TempDir,
    command: String,
    reporter: RecordingReporter,
    cors: CorsConfig,
) -> TestApp {
    let reporter = Arc::new(reporter);
    let supervisor = Arc::new(StreamSupervisor::new(
        TranscoderConfig {
            ffmpeg_command: command,
            output_root: dir.path().join("hls"),
            startup_grace: Duration::from_millis(300),
            termination_grace: Duration::from_secs(2),
            ..TranscoderConfig::default()
        },
        SupervisorConfig {
            metrics_push_interval: Duration::from_millis(100),
            ..SupervisorConfig::default()
        },
        Arc::new(SessionRegistry::new()),
        reporter.clone(),
    ));
    let auth = Arc::new(AuthStore::new(&Default::default()));
    let router = create_router(AppState::new(supervisor.clone(), auth.clone()), &cors);

    TestApp {
        router,
        supervisor,
        auth,
        reporter,
        dir,
    }
}

impl TestApp {
    /// Pair through the API and return the bearer token
    pub async fn token(&self) -> String {
        let (_, code) = self.send(Method::GET, "/pairing-code", None, None).await;
        let (status, body) = self
            .send(
                Method::POST,
                "/pair",
                None,
                Some(json!({ "code": code["code"] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
        };
        (status, json)
    }

    pub async fn start(&self, token: &str, device_id: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/devices/{device_id}/streams"),
            Some(token),
            Some(json!({ "sourceUrl": "rtsp://10.0.0.2/live", "protocol": "rtsp" })),
        )
        .await
    }

    /// Poll `check` until it holds or `timeout` passes
    pub async fn eventually<F>(&self, timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        check()
    }
}
