pub mod primary;
pub mod scheduler;
pub mod stall;

pub use primary::{EventLoop, EventLoopHandle, PrimaryContext, PrimaryTask};
pub use scheduler::{CancelHandle, IntervalScheduler, RepeatingTask, Scheduler, ThreadScheduler};
pub use stall::{StallCounters, StallMonitor};

use serde::Serialize;

/// Stalls accumulated since the previous snapshot.
///
/// `longest_ms` is zero exactly when `count` is zero: a stall is never
/// recorded with a delay below the (non-zero) threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StallSnapshot {
    pub count: u64,
    pub longest_ms: f64,
}

impl StallSnapshot {
    pub const EMPTY: Self = Self {
        count: 0,
        longest_ms: 0.0,
    };

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
