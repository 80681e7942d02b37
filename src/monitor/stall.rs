use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use super::primary::PrimaryContext;
use super::scheduler::{CancelHandle, RepeatingTask, Scheduler};
use super::StallSnapshot;
use crate::config::MonitorConfig;
use crate::error::ConfigError;

// ─── Live counters ───────────────────────────────────────────────

/// Stall count and longest stall, guarded as one pair.
///
/// Probe continuations call [`record`](Self::record) from the primary
/// context while snapshot readers call [`take`](Self::take) from anywhere.
/// Both touch the pair under one lock, so a reader never sees a torn pair
/// and each stall lands in exactly one snapshot.
#[derive(Debug, Default)]
pub struct StallCounters {
    tally: Mutex<StallSnapshot>,
}

impl StallCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts `delay` as a stall when it reaches `threshold`.
    /// Returns whether it did.
    pub fn record(&self, delay: Duration, threshold: Duration) -> bool {
        if delay < threshold {
            return false;
        }
        let delay_ms = (delay.as_secs_f64() * 1_000.0).round();

        let mut tally = self.tally.lock();
        tally.count += 1;
        if delay_ms > tally.longest_ms {
            tally.longest_ms = delay_ms;
        }
        true
    }

    /// Returns the accumulated pair and resets it to zero in one step.
    pub fn take(&self) -> StallSnapshot {
        std::mem::take(&mut *self.tally.lock())
    }

    /// Current pair without resetting.
    pub fn peek(&self) -> StallSnapshot {
        *self.tally.lock()
    }
}

// ─── Monitor ─────────────────────────────────────────────────────

/// Measures how late trivial probes run on the primary context.
///
/// Every `period` the scheduler posts a probe stamped with the post time.
/// When the primary context gets to it, the probe computes its scheduling
/// delay and records a stall if the delay reaches the threshold. A single
/// long block therefore shows up as a cascade: roughly one stall per period
/// of blocking, the oldest probe carrying the full blocking duration.
pub struct StallMonitor {
    config: MonitorConfig,
    scheduler: Arc<dyn Scheduler>,
    primary: Arc<dyn PrimaryContext>,
    counters: Arc<StallCounters>,
    running: AtomicBool,
    prober: Mutex<Option<CancelHandle>>,
}

impl StallMonitor {
    pub fn new(
        config: MonitorConfig,
        scheduler: Arc<dyn Scheduler>,
        primary: Arc<dyn PrimaryContext>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            scheduler,
            primary,
            counters: Arc::new(StallCounters::new()),
            running: AtomicBool::new(false),
            prober: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Schedules the prober. Calling it again while running is a no-op.
    ///
    /// A scheduling failure is logged and leaves the monitor stopped; it
    /// then simply reports no stalls.
    pub fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("stall monitor already running");
            return;
        }

        let mut prober = self.prober.lock();
        // A concurrent stop() may have won the lock first.
        if !self.running.load(Ordering::Acquire) || prober.is_some() {
            return;
        }

        match self
            .scheduler
            .schedule_repeating(self.config.period(), self.probe_task())
        {
            Ok(handle) => {
                *prober = Some(handle);
                info!(
                    period_ms = self.config.period_ms,
                    threshold_ms = self.config.stall_threshold_ms,
                    "stall monitor started"
                );
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                error!(error = %e, "stall monitor could not schedule its prober");
            }
        }
    }

    /// Cancels the prober. Safe to call when not started.
    ///
    /// Probes already posted may still run and update the counters.
    pub fn stop(&self) {
        let mut prober = self.prober.lock();
        if let Some(handle) = prober.take() {
            handle.cancel();
            info!("stall monitor stopped");
        }
        self.running.store(false, Ordering::Release);
    }

    /// Returns the stalls seen since the previous call and resets them.
    pub fn snapshot_and_reset(&self) -> StallSnapshot {
        self.counters.take()
    }

    fn probe_task(&self) -> RepeatingTask {
        let primary = self.primary.clone();
        let counters = self.counters.clone();
        let threshold = self.config.stall_threshold();

        Box::new(move || {
            let expected = Instant::now();
            let counters = counters.clone();

            let posted = primary.post(Box::new(move || {
                let delay = expected.elapsed();
                if counters.record(delay, threshold) {
                    debug!(
                        delay_ms = delay.as_secs_f64() * 1_000.0,
                        "primary context stall"
                    );
                }
            }));

            if posted.is_err() {
                trace!("primary context closed, probe dropped");
            }
        })
    }
}

impl Drop for StallMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StallMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StallMonitor")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("pending", &self.counters.peek())
            .finish()
    }
}
