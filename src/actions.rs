//! Instrumented actions.
//!
//! [`ActionRunner`] wraps a unit of host work with the measurement contract:
//! time it, measure the heap delta, let queued probes drain, take a stall
//! snapshot, and hand the resulting [`ActionEvent`] to the sender.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ActionError;
use crate::monitor::{EventLoopHandle, StallMonitor};
use crate::telemetry::{ActionEvent, EventSender, ThreadKind};

// ─── Heap gauge ──────────────────────────────────────────────────

/// Source of the "heap in use" reading taken before and after an action.
pub trait HeapGauge: Send + Sync {
    /// Bytes in use, or `None` when the platform gives no reading.
    fn used_bytes(&self) -> Option<i64>;
}

/// Resident set size from the `VmRSS` line of `/proc/self/status`.
///
/// Reported in kB by the kernel whatever the page size. Reports nothing off
/// Linux.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResidentMemoryGauge;

impl HeapGauge for ResidentMemoryGauge {
    fn used_bytes(&self) -> Option<i64> {
        if !cfg!(target_os = "linux") {
            return None;
        }
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

/// `VmRSS:    12345 kB` as bytes.
fn parse_vm_rss(status: &str) -> Option<i64> {
    let rest = status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kb: i64 = rest.split_whitespace().next()?.parse().ok()?;
    Some(kb * 1024)
}

fn heap_delta(before: Option<i64>, after: Option<i64>) -> i64 {
    match (before, after) {
        (Some(before), Some(after)) => after - before,
        _ => 0,
    }
}

// ─── Runner ──────────────────────────────────────────────────────

/// Runs host work and reports it.
#[derive(Clone)]
pub struct ActionRunner {
    monitor: Arc<StallMonitor>,
    sender: EventSender,
    primary: EventLoopHandle,
    heap: Arc<dyn HeapGauge>,
}

impl ActionRunner {
    pub fn new(
        monitor: Arc<StallMonitor>,
        sender: EventSender,
        primary: EventLoopHandle,
        heap: Arc<dyn HeapGauge>,
    ) -> Self {
        Self {
            monitor,
            sender,
            primary,
            heap,
        }
    }

    /// Runs `work` on the primary context, where blocking freezes the UI.
    pub async fn run_on_primary<F>(&self, action: &str, work: F) -> Result<ActionEvent, ActionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let heap_before = self.heap.used_bytes();
        let started = Instant::now();

        self.primary.invoke(work).await?;

        self.finish(action, ThreadKind::Primary, started, heap_before)
            .await
    }

    /// Runs `work` on the blocking pool, then posts a trivial continuation
    /// to the primary context the way a UI update would.
    pub async fn run_offloaded<F>(&self, action: &str, work: F) -> Result<ActionEvent, ActionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let heap_before = self.heap.used_bytes();
        let started = Instant::now();

        if let Err(e) = tokio::task::spawn_blocking(work).await {
            warn!(action, error = %e, "offloaded work did not complete");
        }
        self.primary.invoke(|| ()).await?;

        self.finish(action, ThreadKind::Offloaded, started, heap_before)
            .await
    }

    async fn finish(
        &self,
        action: &str,
        thread: ThreadKind,
        started: Instant,
        heap_before: Option<i64>,
    ) -> Result<ActionEvent, ActionError> {
        let duration = started.elapsed();
        let heap_after = self.heap.used_bytes();

        // Probes queued behind the work run before this returns.
        self.primary.settle().await?;
        let stalls = self.monitor.snapshot_and_reset();

        let event = ActionEvent::new(
            action,
            duration,
            thread,
            heap_delta(heap_before, heap_after),
            stalls,
        )?;

        debug!(
            action,
            duration_ms = event.duration_ms(),
            count = stalls.count,
            longest_ms = stalls.longest_ms,
            "action measured"
        );
        self.sender.send_async(event.clone());
        Ok(event)
    }
}

/// The stock demo actions: a no-op baseline, a deliberately blocking action,
/// and the same blocking work done correctly off the primary context.
pub mod demo {
    use super::*;

    pub const MEASURE: &str = "FreezeGuard.MeasureAction";
    pub const BAD_BLOCKING: &str = "FreezeGuard.BadBlockingAction";
    pub const BACKGROUND_FIX: &str = "FreezeGuard.BackgroundFixAction";

    pub async fn measure(runner: &ActionRunner) -> Result<ActionEvent, ActionError> {
        runner.run_on_primary(MEASURE, || ()).await
    }

    pub async fn bad_blocking(
        runner: &ActionRunner,
        block: Duration,
    ) -> Result<ActionEvent, ActionError> {
        runner
            .run_on_primary(BAD_BLOCKING, move || std::thread::sleep(block))
            .await
    }

    pub async fn background_fix(
        runner: &ActionRunner,
        work: Duration,
    ) -> Result<ActionEvent, ActionError> {
        runner
            .run_offloaded(BACKGROUND_FIX, move || std::thread::sleep(work))
            .await
    }
}
