//! Tick Scheduler
//!
//! Fixed-period tick source for the authoritative peer. Missed ticks are
//! skipped, never replayed. While stopped, [`TickScheduler::tick`] never
//! resolves, so it can sit in a `select!` unconditionally.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Start/stop tick source.
#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    interval: Option<Interval>,
}

impl TickScheduler {
    /// Create a stopped scheduler.
    pub fn new(period: Duration) -> Self {
        Self { period, interval: None }
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Is the scheduler armed?
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Arm the scheduler. First tick fires one period from now.
    ///
    /// No-op if already running.
    pub fn start(&mut self) {
        if self.interval.is_none() {
            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.interval = Some(interval);
        }
    }

    /// Disarm the scheduler.
    pub fn stop(&mut self) {
        self.interval = None;
    }

    /// Start or stop to match `should_run`.
    pub fn reconcile(&mut self, should_run: bool) {
        match (should_run, self.is_running()) {
            (true, false) => self.start(),
            (false, true) => self.stop(),
            _ => {}
        }
    }

    /// Wait for the next tick. Pending forever while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
