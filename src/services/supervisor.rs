//! Stream session supervisor
//!
//! Starts and stops transcoder sessions and runs the four per-session loops:
//!
//! - telemetry reader: folds `-progress` output into the session metrics
//! - diagnostic logger: drains stderr into tracing
//! - metrics publisher: pushes a snapshot to the bridge API on an interval
//! - exit monitor: waits for the process, publishes the final state, notifies
//!   the bridge API about unplanned exits, then cancels and joins the other
//!   three loops before deregistering the session and deleting its artifacts
//!
//! The final report and the offline notice are handed to a tracked background
//! task, in that order, so teardown never waits on the bridge API.
//!
//! The exit monitor is the only place a session leaves the registry, which is
//! why stop requests signal the process and then wait for the monitor instead
//! of tearing anything down themselves.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::bridge_client::StatusReporter;
use super::ffmpeg_command_builder::{FFmpegCommandBuilder, SourceDescriptor};
use super::process_handle::ProcessHandle;
use super::session::{Session, SessionParams};
use super::session_events::SessionEvents;
use super::session_registry::{SessionLookup, SessionRegistry};
use super::telemetry_parser::telemetry_updates;
use crate::config::defaults::PLAYLIST_FILE_NAME;
use crate::config::{SupervisorConfig, TranscoderConfig};
use crate::errors::{AppError, AppResult};
use crate::models::{
    IngestState, MetricsReport, OfflineNotice, SessionEvent, SessionEventKind, SessionStatus, StartStatus,
    StartStreamRequest, StreamProtocol,
};
use crate::utils::{UrlUtils, validate_artifact_name, validate_device_id};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the exit monitor waits for stderr EOF before recording the exit
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Artifact name clients use for the playlist
pub const PLAYLIST_ALIAS: &str = "playlist";

/// Outcome of a start request
pub struct StartedStream {
    pub status: StartStatus,
    pub session: Arc<Session>,
}

pub struct StreamSupervisor {
    transcoder: TranscoderConfig,
    settings: SupervisorConfig,
    builder: FFmpegCommandBuilder,
    registry: Arc<SessionRegistry>,
    reporter: Arc<dyn StatusReporter>,
    events: SessionEvents,
    /// Last failure per device and when it was recorded
    recent_failures: RwLock<HashMap<String, (String, Instant)>>,
    /// Final reports still in flight to the bridge API
    reports: TaskTracker,
    transcoder_available: AtomicBool,
}

impl StreamSupervisor {
    pub fn new(
        transcoder: TranscoderConfig,
        settings: SupervisorConfig,
        registry: Arc<SessionRegistry>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            builder: FFmpegCommandBuilder::new(transcoder.clone()),
            transcoder,
            settings,
            registry,
            reporter,
            events: SessionEvents::new(),
            recent_failures: RwLock::new(HashMap::new()),
            reports: TaskTracker::new(),
            transcoder_available: AtomicBool::new(true),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SupervisorConfig {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn transcoder_available(&self) -> bool {
        self.transcoder_available.load(Ordering::Relaxed)
    }

    /// Run `<ffmpeg> -version` once and remember whether it worked.
    pub async fn check_transcoder(&self) -> Option<String> {
        let command = &self.transcoder.ffmpeg_command;
        let output = tokio::process::Command::new(command)
            .arg("-version")
            .kill_on_drop(true)
            .output();

        let (available, version) = match timeout(VERSION_CHECK_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = stdout.lines().next().and_then(|line| {
                    line.strip_prefix("ffmpeg version ")
                        .and_then(|rest| rest.split_whitespace().next())
                        .map(str::to_string)
                });
                (true, version)
            }
            Ok(Ok(output)) => {
                warn!("Transcoder '{}' -version failed with status: {}", command, output.status);
                (false, None)
            }
            Ok(Err(e)) => {
                warn!("Failed to execute transcoder '{}': {}", command, e);
                (false, None)
            }
            Err(_) => {
                warn!("Transcoder '{}' -version did not finish within {:?}", command, VERSION_CHECK_TIMEOUT);
                (false, None)
            }
        };

        self.transcoder_available.store(available, Ordering::Relaxed);
        version
    }

    /// Start a session for `device_id`, or return the one already running.
    pub async fn start_stream(
        self: &Arc<Self>,
        device_id: &str,
        request: StartStreamRequest,
    ) -> AppResult<StartedStream> {
        validate_device_id(device_id).map_err(|e| AppError::validation(e.to_string()))?;

        let lookup = self
            .registry
            .get_or_create(device_id, || self.launch_session(device_id, request))
            .await?;

        let status = match &lookup {
            SessionLookup::Created(session) => {
                self.write_failures().remove(device_id);
                info!(
                    device_id,
                    session_id = %session.id(),
                    pid = ?session.process().pid(),
                    "Started stream"
                );
                self.events.publish(session, SessionEventKind::Started);
                if session.process().is_running() && session.mark_running() {
                    self.events.publish(session, SessionEventKind::Running);
                }
                StartStatus::Started
            }
            SessionLookup::Existing(session) => {
                debug!(device_id, session_id = %session.id(), "Stream already running");
                StartStatus::AlreadyRunning
            }
        };

        Ok(StartedStream {
            status,
            session: lookup.session().clone(),
        })
    }

    async fn launch_session(
        self: &Arc<Self>,
        device_id: &str,
        request: StartStreamRequest,
    ) -> AppResult<Arc<Session>> {
        let source_url = self.resolve_source(device_id, request.source_url).await?;
        validate_source(&source_url, request.protocol)?;

        let session_id = Uuid::new_v4();
        let session_dir = self
            .transcoder
            .output_root
            .join(device_id)
            .join(session_id.to_string());
        let descriptor = SourceDescriptor {
            device_id: device_id.to_string(),
            source_url,
            protocol: request.protocol,
            targets: dedupe_targets(request.targets),
            output_dir: session_dir,
        };

        let launched = match ProcessHandle::start(
            &self.builder,
            &descriptor,
            self.transcoder.startup_grace,
        )
        .await
        {
            Ok(launched) => launched,
            Err(e) => {
                remove_artifacts(&descriptor.output_dir).await;
                return Err(e.into());
            }
        };

        let session = Arc::new(Session::new(
            SessionParams {
                id: session_id,
                device_id: descriptor.device_id.clone(),
                protocol: descriptor.protocol,
                targets: descriptor.targets.clone(),
                output_dir: descriptor.output_dir.clone(),
                command: self.builder.display_command(&launched.args[1..]),
                stderr_tail_limit: self.settings.stderr_tail_lines,
            },
            launched.handle,
        ));

        self.spawn_loops(session.clone(), launched.stdout, launched.stderr);
        Ok(session)
    }

    async fn resolve_source(&self, device_id: &str, requested: Option<String>) -> AppResult<String> {
        if let Some(url) = requested.filter(|url| !url.trim().is_empty()) {
            return Ok(url.trim().to_string());
        }
        if !self.reporter.is_configured() {
            return Err(AppError::validation("sourceUrl is required"));
        }

        let device = self.reporter.fetch_device(device_id).await.map_err(|e| {
            warn!(device_id, "Could not resolve source from bridge API: {}", e);
            AppError::from(e)
        })?;
        device
            .rtsp_url()
            .map(str::to_string)
            .ok_or_else(|| AppError::validation("Device missing rtspUrl credential"))
    }

    fn spawn_loops(self: &Arc<Self>, session: Arc<Session>, stdout: ChildStdout, stderr: ChildStderr) {
        let cancel = CancellationToken::new();
        let mut loops = JoinSet::new();

        loops.spawn(read_telemetry(session.clone(), self.events.clone(), stdout, cancel.clone()));
        loops.spawn(publish_metrics(
            session.clone(),
            self.reporter.clone(),
            self.settings.metrics_push_interval,
            cancel.clone(),
        ));
        let diagnostics = tokio::spawn(log_diagnostics(session.clone(), stderr, cancel.clone()));

        tokio::spawn(self.clone().monitor_exit(session, cancel, loops, diagnostics));
    }

    async fn monitor_exit(
        self: Arc<Self>,
        session: Arc<Session>,
        cancel: CancellationToken,
        mut loops: JoinSet<()>,
        mut diagnostics: JoinHandle<()>,
    ) {
        let device_id = session.device_id().to_string();
        let outcome = session.process().wait().await;
        // Stop flag as of the exit. A stop request during the drain below does not change it
        let stopping = session.is_stopping();
        info!(
            device_id = %device_id,
            session_id = %session.id(),
            stopping,
            "Transcoder exited with {}",
            outcome
        );

        // Final stderr lines feed into last_error
        let drained = timeout(STDERR_DRAIN_TIMEOUT, &mut diagnostics).await.is_ok();

        session.record_exit(outcome, stopping);
        let ingest_state = if stopping {
            IngestState::Idle
        } else {
            IngestState::Error
        };
        let report = session.metrics_report(ingest_state);

        let notice = if stopping {
            None
        } else {
            let error = session.last_error();
            if let Some(message) = &error {
                error!(device_id = %device_id, "Stream failed: {}", message);
                self.write_failures()
                    .insert(device_id.clone(), (message.clone(), Instant::now()));
            }
            Some(OfflineNotice {
                device_id: device_id.clone(),
                error,
            })
        };
        self.send_final_reports(device_id.clone(), report, notice);

        cancel.cancel();
        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                warn!(device_id = %device_id, "Supervisor loop ended abnormally: {}", e);
            }
        }
        if !drained {
            if let Err(e) = diagnostics.await {
                warn!(device_id = %device_id, "Diagnostic logger ended abnormally: {}", e);
            }
        }

        self.registry.remove_session(&session).await;
        remove_artifacts(session.output_dir()).await;
        session.mark_finished();

        let kind = if session.last_error().is_some() && !stopping {
            SessionEventKind::Failed
        } else {
            SessionEventKind::Stopped
        };
        self.events.publish(&session, kind);
        debug!(device_id = %device_id, session_id = %session.id(), "Session torn down");
    }

    /// Push the last metrics snapshot, then the offline notice if there is one.
    fn send_final_reports(&self, device_id: String, report: MetricsReport, notice: Option<OfflineNotice>) {
        let reporter = self.reporter.clone();
        self.reports.spawn(async move {
            reporter.push_metrics(&device_id, &report).await;
            if let Some(notice) = notice {
                reporter.notify_offline(&notice).await;
            }
        });
    }

    /// Stop the live session for `device_id`. Fails with `NotRunning` if there is none.
    pub async fn stop_stream(&self, device_id: &str) -> AppResult<()> {
        let session = self
            .registry
            .get(device_id)
            .ok_or_else(|| AppError::not_running(device_id))?;
        self.stop_session(&session).await;
        info!(device_id, session_id = %session.id(), "Stopped stream");
        Ok(())
    }

    /// Operator stop: flag, SIGTERM with kill escalation, then wait for the exit monitor.
    pub async fn stop_session(&self, session: &Session) {
        if session.begin_stop() {
            debug!(device_id = session.device_id(), "Stopping session");
        }
        session
            .process()
            .terminate(self.transcoder.termination_grace)
            .await;
        session.wait_finished().await;
    }

    pub fn status(&self, device_id: &str) -> AppResult<SessionStatus> {
        match self.registry.get(device_id) {
            Some(session) => {
                session.touch();
                Ok(session.status(Instant::now()))
            }
            None => Err(AppError::NotRunning {
                device_id: device_id.to_string(),
                last_error: self
                    .recent_failures
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(device_id)
                    .map(|(message, _)| message.clone()),
            }),
        }
    }

    pub fn list_sessions(&self) -> Vec<SessionStatus> {
        let now = Instant::now();
        self.registry
            .list_all()
            .iter()
            .map(|session| session.status(now))
            .collect()
    }

    /// Resolve an artifact for serving and count the read as activity.
    pub async fn resolve_artifact(&self, device_id: &str, name: &str) -> AppResult<PathBuf> {
        validate_device_id(device_id).map_err(|e| AppError::validation(e.to_string()))?;
        let file_name = if name == PLAYLIST_ALIAS {
            PLAYLIST_FILE_NAME
        } else {
            validate_artifact_name(name).map_err(|e| AppError::validation(e.to_string()))?;
            name
        };

        let session = self
            .registry
            .get(device_id)
            .ok_or_else(|| AppError::not_running(device_id))?;
        session.touch();

        let path = session.output_dir().join(file_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(AppError::not_found("artifact", file_name)),
        }
    }

    /// Forget failures recorded more than `retention` before `now`. Returns how many went.
    pub fn purge_failures(&self, now: Instant, retention: Duration) -> usize {
        let mut failures = self.write_failures();
        let before = failures.len();
        failures.retain(|_, (_, at)| now.saturating_duration_since(*at) <= retention);
        before - failures.len()
    }

    /// Stop every session, then give pending final reports one grace period to go out.
    pub async fn shutdown(&self) {
        let sessions = self.registry.list_all();
        if !sessions.is_empty() {
            info!("Stopping {} active session(s)", sessions.len());
            join_all(sessions.iter().map(|session| self.stop_session(session))).await;
        }

        self.reports.close();
        if timeout(self.transcoder.termination_grace, self.reports.wait())
            .await
            .is_err()
        {
            warn!(
                "Dropping {} undelivered bridge API report(s) on shutdown",
                self.reports.len()
            );
        }
    }

    fn write_failures(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, (String, Instant)>> {
        self.recent_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_source(source_url: &str, protocol: StreamProtocol) -> AppResult<()> {
    let url = Url::parse(source_url).map_err(|_| {
        AppError::validation(format!(
            "sourceUrl is not a valid URL: {}",
            UrlUtils::obfuscate_credentials(source_url)
        ))
    })?;

    let supported = match protocol {
        StreamProtocol::Rtsp => matches!(url.scheme(), "rtsp" | "rtsps"),
        StreamProtocol::Mjpeg => matches!(url.scheme(), "http" | "https"),
    };
    if !supported {
        return Err(AppError::validation(format!(
            "Unsupported source scheme '{}' for protocol {:?}",
            url.scheme(),
            protocol
        )));
    }
    Ok(())
}

/// Targets are an ordered set: first occurrence wins
fn dedupe_targets(targets: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

async fn remove_artifacts(session_dir: &Path) {
    match tokio::fs::remove_dir_all(session_dir).await {
        Ok(()) => debug!("Removed artifacts in {}", session_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", session_dir.display(), e),
    }
    // Device directory goes too once its last session is gone
    if let Some(device_dir) = session_dir.parent() {
        let _ = tokio::fs::remove_dir(device_dir).await;
    }
}

async fn read_telemetry(
    session: Arc<Session>,
    events: SessionEvents,
    stdout: ChildStdout,
    cancel: CancellationToken,
) {
    let updates = telemetry_updates(BufReader::new(stdout));
    tokio::pin!(updates);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            update = updates.next() => match update {
                Some(update) => {
                    if session.record_telemetry(update) {
                        events.publish(&session, SessionEventKind::Running);
                    }
                }
                None => break,
            },
        }
    }
    debug!(device_id = session.device_id(), "Telemetry reader finished");
}

async fn log_diagnostics(session: Arc<Session>, stderr: ChildStderr, cancel: CancellationToken) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim_end().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    log_transcoder_line(session.device_id(), &line);
                    session.push_stderr_line(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(device_id = session.device_id(), "stderr read failed: {}", e);
                    break;
                }
            },
        }
    }
}

fn log_transcoder_line(device_id: &str, line: &str) {
    let lower = line.to_ascii_lowercase();
    if lower.contains("error")
        || lower.contains("failed")
        || lower.contains("invalid")
        || lower.contains("could not")
        || lower.contains("unable to")
    {
        error!(device_id, event = "ffmpeg_error", "{}", line);
    } else if lower.contains("warning") || lower.contains("deprecated") {
        warn!(device_id, event = "ffmpeg_warning", "{}", line);
    } else {
        debug!(device_id, event = "ffmpeg_output", "{}", line);
    }
}

async fn publish_metrics(
    session: Arc<Session>,
    reporter: Arc<dyn StatusReporter>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !session.process().is_running() {
                    break;
                }
                let report = session.metrics_report(IngestState::Running);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = reporter.push_metrics(session.device_id(), &report) => {}
                }
            }
        }
    }
}
