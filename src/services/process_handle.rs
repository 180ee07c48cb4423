//! Ownership of one transcoder subprocess
//!
//! A dedicated waiter task owns the `Child` and publishes its exit status on a
//! watch channel, so any number of callers can await the exit while
//! `terminate` still has a way to escalate to a hard kill.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use super::ffmpeg_command_builder::{FFmpegCommandBuilder, SourceDescriptor};
use crate::errors::LaunchError;

/// Upper bound on captured stderr for launch diagnostics
const MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024;
/// How long to wait for stderr EOF after an early exit
const DIAGNOSTIC_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How the transcoder ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// A freshly started transcoder plus the pipes the supervisor loops consume
pub struct LaunchedProcess {
    pub handle: ProcessHandle,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    /// Full argv, program first
    pub args: Vec<String>,
}

pub struct ProcessHandle {
    pid: Option<u32>,
    started_at: Instant,
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
    kill: Arc<Notify>,
    terminate_requested: AtomicBool,
    kill_requested: AtomicBool,
}

impl ProcessHandle {
    /// Spawn the transcoder for `source` and hold it through the startup grace window.
    ///
    /// A non-zero exit inside the window becomes `LaunchFailed` carrying whatever the
    /// process wrote to stderr. An exit with code 0 is handed back as a normal handle
    /// and left to the exit monitor.
    pub async fn start(
        builder: &FFmpegCommandBuilder,
        source: &SourceDescriptor,
        startup_grace: Duration,
    ) -> Result<LaunchedProcess, LaunchError> {
        tokio::fs::create_dir_all(&source.output_dir)
            .await
            .map_err(|e| {
                LaunchError::launch_failed(format!(
                    "Cannot create output directory {}: {e}",
                    source.output_dir.display()
                ))
            })?;

        let program = builder.program().to_string();
        let args = builder.build_args(source);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LaunchError::BinaryNotFound {
                    command: program.clone(),
                },
                _ => LaunchError::launch_failed(format!("Failed to spawn {program}: {e}")),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::launch_failed("Transcoder stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LaunchError::launch_failed("Transcoder stderr was not captured"))?;

        let pid = child.id();
        let handle = Self::supervise(child, pid);
        info!(
            device_id = %source.device_id,
            pid = ?pid,
            "Spawned transcoder {}",
            program
        );

        tokio::select! {
            outcome = handle.wait() => {
                if !outcome.success() {
                    let diagnostic = read_diagnostic(&mut stderr).await;
                    warn!(
                        device_id = %source.device_id,
                        "Transcoder exited with {} during startup: {}",
                        outcome,
                        diagnostic.as_deref().unwrap_or("<no output>")
                    );
                    return Err(LaunchError::LaunchFailed {
                        message: format!("transcoder exited with {outcome} during startup"),
                        diagnostic,
                    });
                }
                debug!(device_id = %source.device_id, "Transcoder exited cleanly during startup");
            }
            _ = tokio::time::sleep(startup_grace) => {}
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program);
        argv.extend(args);

        Ok(LaunchedProcess {
            handle,
            stdout,
            stderr,
            args: argv,
        })
    }

    fn supervise(mut child: Child, pid: Option<u32>) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = Arc::new(Notify::new());
        let kill_signal = kill.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_signal.notified() => {
                    if let Err(e) = child.start_kill() {
                        debug!(pid = ?pid, "start_kill failed: {}", e);
                    }
                    child.wait().await
                }
            };
            let outcome = match status {
                Ok(status) => ExitOutcome::from(status),
                Err(e) => {
                    warn!(pid = ?pid, "Failed to wait for transcoder: {}", e);
                    ExitOutcome::unknown()
                }
            };
            let _ = exit_tx.send(Some(outcome));
        });

        Self {
            pid,
            started_at: Instant::now(),
            exit_rx,
            kill,
            terminate_requested: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Exit status if the process has already been reaped
    pub fn exit_status(&self) -> Option<ExitOutcome> {
        *self.exit_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> ExitOutcome {
        let mut rx = self.exit_rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome,
            Err(_) => None,
        };
        outcome.unwrap_or_else(ExitOutcome::unknown)
    }

    /// SIGTERM, then SIGKILL once `grace` has passed.
    ///
    /// Calling this on an exited process returns its status straight away. Concurrent
    /// callers share one escalation: only the first sends signals, the rest wait.
    pub async fn terminate(&self, grace: Duration) -> ExitOutcome {
        if let Some(outcome) = self.exit_status() {
            return outcome;
        }

        if self.terminate_requested.swap(true, Ordering::SeqCst) {
            return self.wait().await;
        }

        if !self.send_terminate() {
            self.force_kill();
            return self.wait().await;
        }

        match tokio::time::timeout(grace, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    "Transcoder did not exit within {:?}, killing",
                    grace
                );
                self.force_kill();
                self.wait().await
            }
        }
    }

    #[cfg(unix)]
    fn send_terminate(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                debug!(pid = raw, "Sent SIGTERM to transcoder");
                true
            }
            Err(e) => {
                debug!(pid = raw, "SIGTERM failed: {}", e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&self) -> bool {
        false
    }

    fn force_kill(&self) {
        if !self.kill_requested.swap(true, Ordering::SeqCst) {
            self.kill.notify_one();
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_running() {
            self.force_kill();
        }
    }
}

async fn read_diagnostic(stderr: &mut ChildStderr) -> Option<String> {
    let mut buf = Vec::new();
    let mut limited = stderr.take(MAX_DIAGNOSTIC_BYTES as u64);
    let _ = tokio::time::timeout(DIAGNOSTIC_READ_TIMEOUT, limited.read_to_end(&mut buf)).await;
    let text = String::from_utf8_lossy(&buf).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::TranscoderConfig;
    use crate::models::StreamProtocol;
    use crate::test_support::write_script;
    use serial_test::serial;

    fn source(dir: &std::path::Path) -> SourceDescriptor {
        SourceDescriptor {
            device_id: "cam-1".to_string(),
            source_url: "rtsp://10.0.0.2/live".to_string(),
            protocol: StreamProtocol::Rtsp,
            targets: vec![],
            output_dir: dir.join("cam-1").join("session"),
        }
    }

    fn builder(command: String) -> FFmpegCommandBuilder {
        FFmpegCommandBuilder::new(TranscoderConfig {
            ffmpeg_command: command,
            ..TranscoderConfig::default()
        })
    }

    #[tokio::test]
    #[serial]
    async fn missing_binary_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessHandle::start(
            &builder("/nonexistent/bin/ffmpeg".to_string()),
            &source(dir.path()),
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(LaunchError::BinaryNotFound { .. })));
    }

    #[tokio::test]
    #[serial]
    async fn early_non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fail.sh", "echo 'rtsp://cam: Connection refused' >&2\nexit 1\n");

        let result =
            ProcessHandle::start(&builder(script), &source(dir.path()), Duration::from_secs(2)).await;

        match result {
            Err(LaunchError::LaunchFailed { diagnostic, .. }) => {
                assert!(diagnostic.unwrap().contains("Connection refused"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("launch should have failed"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn cooperative_process_exits_on_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ok.sh", "trap 'exit 0' TERM\nwhile true; do sleep 0.1; done\n");
        let launched =
            ProcessHandle::start(&builder(script), &source(dir.path()), Duration::from_millis(200))
                .await
                .unwrap();
        assert!(launched.handle.is_running());

        let started = Instant::now();
        let outcome = launched.handle.terminate(Duration::from_secs(5)).await;
        assert!(outcome.success(), "{outcome}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    #[serial]
    async fn stubborn_process_is_killed_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nwhile true; do sleep 0.1; done\n");
        let launched =
            ProcessHandle::start(&builder(script), &source(dir.path()), Duration::from_millis(200))
                .await
                .unwrap();

        let grace = Duration::from_millis(500);
        let started = Instant::now();
        let outcome = launched.handle.terminate(grace).await;
        let elapsed = started.elapsed();

        assert!(!outcome.success());
        assert_eq!(outcome.signal, Some(9));
        assert!(elapsed >= grace, "{elapsed:?}");
        assert!(elapsed < grace + Duration::from_secs(1), "{elapsed:?}");
    }

    #[tokio::test]
    #[serial]
    async fn terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "ok.sh", "trap 'exit 0' TERM\nwhile true; do sleep 0.1; done\n");
        let launched =
            ProcessHandle::start(&builder(script), &source(dir.path()), Duration::from_millis(200))
                .await
                .unwrap();

        let first = launched.handle.terminate(Duration::from_secs(5)).await;
        let started = Instant::now();
        let second = launched.handle.terminate(Duration::from_secs(5)).await;
        assert_eq!(first, second);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(!launched.handle.is_running());
    }
}
