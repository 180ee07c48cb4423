//! Per-device session aggregate
//!
//! A `Session` owns the transcoder handle for one device together with the
//! telemetry snapshot, lifecycle state and bookkeeping timestamps. Fields that
//! the supervisor loops write are behind short-lived std locks; nothing here is
//! held across an `.await`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::process_handle::{ExitOutcome, ProcessHandle};
use crate::models::{
    IngestState, MetricsReport, SessionState, SessionStatus, StreamProtocol, TelemetrySample,
    TelemetryUpdate,
};

pub struct Session {
    id: Uuid,
    device_id: String,
    protocol: StreamProtocol,
    targets: Vec<String>,
    output_dir: PathBuf,
    command: Vec<String>,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    last_accessed_at: Mutex<Instant>,
    metrics: RwLock<TelemetrySample>,
    last_telemetry_at: Mutex<Option<Instant>>,
    last_error: RwLock<Option<String>>,
    stderr_tail: Mutex<VecDeque<String>>,
    stderr_tail_limit: usize,
    stopping: AtomicBool,
    state: watch::Sender<SessionState>,
    finished: watch::Sender<bool>,
    process: ProcessHandle,
}

/// Everything needed to build a session around a started process
pub struct SessionParams {
    pub id: Uuid,
    pub device_id: String,
    pub protocol: StreamProtocol,
    pub targets: Vec<String>,
    pub output_dir: PathBuf,
    pub command: Vec<String>,
    pub stderr_tail_limit: usize,
}

impl Session {
    pub fn new(params: SessionParams, process: ProcessHandle) -> Self {
        let now = Instant::now();
        Self {
            id: params.id,
            device_id: params.device_id,
            protocol: params.protocol,
            targets: params.targets,
            output_dir: params.output_dir,
            command: params.command,
            started_at: now,
            started_at_utc: Utc::now(),
            last_accessed_at: Mutex::new(now),
            metrics: RwLock::new(TelemetrySample::default()),
            last_telemetry_at: Mutex::new(None),
            last_error: RwLock::new(None),
            stderr_tail: Mutex::new(VecDeque::with_capacity(params.stderr_tail_limit)),
            stderr_tail_limit: params.stderr_tail_limit,
            stopping: AtomicBool::new(false),
            state: watch::Sender::new(SessionState::Starting),
            finished: watch::Sender::new(false),
            process,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        read(&self.last_error).clone()
    }

    pub fn metrics(&self) -> TelemetrySample {
        *read(&self.metrics)
    }

    /// Refresh `last_accessed_at`. Never moves it backwards.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        let mut last = lock(&self.last_accessed_at);
        if at > *last {
            *last = at;
        }
    }

    pub fn last_accessed_at(&self) -> Instant {
        *lock(&self.last_accessed_at)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_accessed_at())
    }

    /// Fold a telemetry update in. The first one also promotes `starting` to `running`,
    /// in which case this returns `true`.
    pub fn record_telemetry(&self, update: TelemetryUpdate) -> bool {
        write(&self.metrics).apply(update);
        *lock(&self.last_telemetry_at) = Some(Instant::now());
        self.mark_running()
    }

    pub fn push_stderr_line(&self, line: String) {
        if self.stderr_tail_limit == 0 {
            return;
        }
        let mut tail = lock(&self.stderr_tail);
        if tail.len() == self.stderr_tail_limit {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    pub fn last_stderr_line(&self) -> Option<String> {
        lock(&self.stderr_tail).back().cloned()
    }

    /// `starting -> running`; any other state is left alone. Returns whether it moved.
    pub fn mark_running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Starting {
                *state = SessionState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Flag an operator-requested stop. Returns `false` if a stop was already underway.
    pub fn begin_stop(&self) -> bool {
        let first = !self.stopping.swap(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.is_live() {
                *state = SessionState::Stopping;
                true
            } else {
                false
            }
        });
        first
    }

    /// Record how the transcoder ended.
    ///
    /// `stopping` is the stop flag as the exit monitor saw it when the process
    /// exited; a stop that lands later does not turn a crash into a clean exit.
    /// Only an unrequested non-zero exit counts as an error. A spontaneous exit
    /// with code 0 is indistinguishable from an operator stop and is not flagged.
    pub fn record_exit(&self, outcome: ExitOutcome, stopping: bool) -> SessionState {
        if !stopping && !outcome.success() {
            let mut message = match outcome.code {
                Some(code) => format!("ffmpeg exited with code {code}"),
                None => format!("ffmpeg exited with {outcome}"),
            };
            if let Some(line) = self.last_stderr_line() {
                message.push_str(": ");
                message.push_str(&line);
            }
            *write(&self.last_error) = Some(message);
            self.state.send_replace(SessionState::Error);
        } else {
            self.state.send_if_modified(|state| {
                if state.is_live() {
                    *state = SessionState::Stopping;
                    true
                } else {
                    false
                }
            });
        }
        self.state()
    }

    /// Called by the exit monitor once every loop has drained and the registry entry is gone.
    pub fn mark_finished(&self) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Error {
                false
            } else {
                *state = SessionState::Terminated;
                true
            }
        });
        self.finished.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Resolves once the exit monitor has fully torn the session down.
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|finished| *finished).await;
    }

    /// Snapshot for the metrics push. Rates are zeroed when idle and rounded to 2 decimals.
    pub fn metrics_report(&self, ingest_state: IngestState) -> MetricsReport {
        let metrics = self.metrics();
        let (fps, bitrate_kbps) = match ingest_state {
            IngestState::Idle => (0.0, 0.0),
            _ => (round2(metrics.fps), round2(metrics.bitrate_kbps)),
        };
        MetricsReport {
            fps,
            bitrate_kbps,
            frame_count: metrics.frame_count,
            targets: self.targets.clone(),
            ingest_state,
            last_heartbeat: Utc::now(),
            last_error: match ingest_state {
                IngestState::Error => self.last_error(),
                _ => None,
            },
        }
    }

    pub fn status(&self, now: Instant) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            device_id: self.device_id.clone(),
            session_id: self.id,
            state,
            running: self.process.is_running() && state.is_live(),
            targets: self.targets.clone(),
            protocol: self.protocol,
            metrics: self.metrics(),
            last_error: self.last_error(),
            started_at: self.started_at_utc,
            uptime_seconds: now.saturating_duration_since(self.started_at).as_secs(),
            idle_seconds: self.idle_for(now).as_secs(),
            last_telemetry_age_ms: lock(&self.last_telemetry_at)
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            command: self.command.clone(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
