//! Periodic scheduling for the stall prober.
//!
//! The two host flavours schedule probes differently: a dedicated
//! scheduled-queue thread ([`ThreadScheduler`]) or an interval timer on an
//! async runtime ([`IntervalScheduler`]). The prober only sees [`Scheduler`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::error::ScheduleError;

/// Body of a repeating task. Runs on the scheduler's own context, never on
/// the primary context.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Capability to run a task every `period` until cancelled.
pub trait Scheduler: Send + Sync {
    fn schedule_repeating(
        &self,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<CancelHandle, ScheduleError>;
}

// ─── Cancel handle ───────────────────────────────────────────────

/// Cancels the repeating task when consumed or dropped.
///
/// Cancellation is best-effort: an invocation already running completes.
pub struct CancelHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

// ─── Dedicated thread ────────────────────────────────────────────

/// One OS thread per scheduled task, ticking at a fixed rate.
///
/// Ticks missed while the thread was descheduled are skipped, not replayed.
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    thread_name: String,
}

impl ThreadScheduler {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new("freeze-guard-prober")
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(
        &self,
        period: Duration,
        mut task: RepeatingTask,
    ) -> Result<CancelHandle, ScheduleError> {
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod);
        }

        let signal = Arc::new(StopSignal::default());
        let worker_signal = signal.clone();

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    {
                        let mut stopped = worker_signal.stopped.lock();
                        while !*stopped && Instant::now() < next {
                            worker_signal.wake.wait_until(&mut stopped, next);
                        }
                        if *stopped {
                            break;
                        }
                    }

                    task();

                    next += period;
                    let now = Instant::now();
                    while next <= now {
                        next += period;
                    }
                }
            })?;

        Ok(CancelHandle::new(move || {
            *signal.stopped.lock() = true;
            signal.wake.notify_all();
        }))
    }
}

// ─── Async interval ──────────────────────────────────────────────

/// Ticks from a tokio interval timer on the given runtime.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    runtime: Handle,
}

impl IntervalScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Binds to the runtime of the calling context.
    pub fn current() -> Result<Self, ScheduleError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for IntervalScheduler {
    fn schedule_repeating(
        &self,
        period: Duration,
        mut task: RepeatingTask,
    ) -> Result<CancelHandle, ScheduleError> {
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod);
        }

        let ticker = self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut ticks = IntervalStream::new(interval);
            while ticks.next().await.is_some() {
                task();
            }
        });

        Ok(CancelHandle::new(move || ticker.abort()))
    }
}
