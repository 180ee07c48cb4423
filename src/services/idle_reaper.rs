use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use super::auth_store::AuthStore;
use super::supervisor::StreamSupervisor;

/// What one sweep did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_tokens: usize,
    pub expired_failures: usize,
    pub reaped_devices: Vec<String>,
}

/// Periodic sweep that stops idle sessions and expires auth state and remembered failures
pub struct IdleReaper {
    supervisor: Arc<StreamSupervisor>,
    auth: Arc<AuthStore>,
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(
        supervisor: Arc<StreamSupervisor>,
        auth: Arc<AuthStore>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            supervisor,
            auth,
            idle_timeout,
            interval,
        }
    }

    /// Sweep every `interval` until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting idle reaper with interval: {:?}, idle timeout: {:?}",
            self.interval, self.idle_timeout
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(Instant::now()).await;
                }
            }
        }
        info!("Idle reaper stopped");
    }

    /// One pass: expire tokens and old failures, then stop every session idle for longer
    /// than the timeout. Failures are kept as long as an idle session would be.
    pub async fn sweep(&self, now: Instant) -> SweepReport {
        let expired_tokens = self.auth.purge_expired(now);
        let expired_failures = self.supervisor.purge_failures(now, self.idle_timeout);

        let idle: Vec<_> = self
            .supervisor
            .registry()
            .list_all()
            .into_iter()
            .filter(|session| session.idle_for(now) > self.idle_timeout)
            .collect();

        for session in &idle {
            info!(
                device_id = session.device_id(),
                idle_secs = session.idle_for(now).as_secs(),
                "Reaping idle session"
            );
        }
        join_all(idle.iter().map(|session| self.supervisor.stop_session(session))).await;

        let report = SweepReport {
            expired_tokens,
            expired_failures,
            reaped_devices: idle.iter().map(|s| s.device_id().to_string()).collect(),
        };
        if report.expired_tokens > 0
            || report.expired_failures > 0
            || !report.reaped_devices.is_empty()
        {
            info!(
                "Idle reaper: {} token(s) expired, {} failure(s) forgotten, {} session(s) reaped",
                report.expired_tokens,
                report.expired_failures,
                report.reaped_devices.len()
            );
        } else {
            trace!("Idle reaper: nothing to do");
        }
        report
    }
}
