use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::actions::{ActionRunner, HeapGauge};
use crate::config::GuardConfig;
use crate::error::SenderError;
use crate::monitor::{EventLoopHandle, PrimaryContext, Scheduler, StallMonitor, StallSnapshot};
use crate::telemetry::{ActionEvent, EventSender};

/// Process root for the instrumentation.
///
/// Built once by the host's application root and shared with every window.
/// Owns the one [`StallMonitor`] and the one [`EventSender`]; the monitor is
/// started on the first [`attach_window`](Self::attach_window) and never a
/// second time, however many windows attach concurrently.
pub struct FreezeGuard {
    monitor: Arc<StallMonitor>,
    sender: EventSender,
    windows: AtomicUsize,
}

impl FreezeGuard {
    pub fn new(
        config: &GuardConfig,
        scheduler: Arc<dyn Scheduler>,
        primary: Arc<dyn PrimaryContext>,
        runtime: Handle,
    ) -> Result<Self, SenderError> {
        config.validate()?;
        let monitor = StallMonitor::new(config.monitor, scheduler, primary)?;
        let sender = EventSender::new(config.sender.clone(), runtime)?;

        Ok(Self {
            monitor: Arc::new(monitor),
            sender,
            windows: AtomicUsize::new(0),
        })
    }

    /// Registers a window and makes sure the monitor is running.
    /// Returns how many windows have attached so far.
    pub fn attach_window(&self) -> usize {
        let windows = self.windows.fetch_add(1, Ordering::AcqRel) + 1;
        self.monitor.start();
        info!(windows, "window attached");
        windows
    }

    pub fn windows(&self) -> usize {
        self.windows.load(Ordering::Acquire)
    }

    pub fn monitor(&self) -> &Arc<StallMonitor> {
        &self.monitor
    }

    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    pub fn snapshot_and_reset(&self) -> StallSnapshot {
        self.monitor.snapshot_and_reset()
    }

    pub fn send_async(&self, event: ActionEvent) {
        self.sender.send_async(event);
    }

    pub async fn ping(&self) -> i32 {
        self.sender.ping().await
    }

    pub fn runner(&self, primary: EventLoopHandle, heap: Arc<dyn HeapGauge>) -> ActionRunner {
        ActionRunner::new(self.monitor.clone(), self.sender.clone(), primary, heap)
    }

    /// Process teardown.
    pub fn shutdown(&self) {
        self.monitor.stop();
    }
}

impl std::fmt::Debug for FreezeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreezeGuard")
            .field("monitor", &self.monitor)
            .field("sender", &self.sender)
            .field("windows", &self.windows())
            .finish()
    }
}
