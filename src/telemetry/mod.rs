pub mod sender;
pub mod wire;

pub use sender::{Delivery, EventSender, PING_UNREACHABLE};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::monitor::StallSnapshot;

/// Where an instrumented action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    /// On the UI-serialization context
    Primary,
    /// Off it, on a worker
    Offloaded,
}

/// Host flavour; decides the thread label written on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// Swing-style event-dispatch thread: `EDT` / `BGT`
    #[default]
    IntelliJ,
    /// Single-threaded event loop: `MAIN` / `WORKER`
    VsCode,
}

/// Every thread label a collector accepts.
pub const THREAD_LABELS: [&str; 4] = ["EDT", "BGT", "MAIN", "WORKER"];

impl HostKind {
    pub fn thread_label(self, thread: ThreadKind) -> &'static str {
        match (self, thread) {
            (Self::IntelliJ, ThreadKind::Primary) => "EDT",
            (Self::IntelliJ, ThreadKind::Offloaded) => "BGT",
            (Self::VsCode, ThreadKind::Primary) => "MAIN",
            (Self::VsCode, ThreadKind::Offloaded) => "WORKER",
        }
    }

    /// Inverse of [`thread_label`](Self::thread_label).
    pub fn from_thread_label(label: &str) -> Option<(Self, ThreadKind)> {
        match label {
            "EDT" => Some((Self::IntelliJ, ThreadKind::Primary)),
            "BGT" => Some((Self::IntelliJ, ThreadKind::Offloaded)),
            "MAIN" => Some((Self::VsCode, ThreadKind::Primary)),
            "WORKER" => Some((Self::VsCode, ThreadKind::Offloaded)),
            _ => None,
        }
    }
}

impl std::str::FromStr for HostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intellij" => Ok(Self::IntelliJ),
            "vscode" => Ok(Self::VsCode),
            other => Err(format!("unknown host \"{other}\" (expected intellij or vscode)")),
        }
    }
}

// ─── Action event ────────────────────────────────────────────────

/// One completed instrumented action. Built once, never mutated, moved into
/// the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    action: String,
    duration: Duration,
    thread: ThreadKind,
    heap_delta_bytes: i64,
    stalls: StallSnapshot,
    timestamp: DateTime<Utc>,
}

impl ActionEvent {
    /// Stamps the event with the current time.
    pub fn new(
        action: impl Into<String>,
        duration: Duration,
        thread: ThreadKind,
        heap_delta_bytes: i64,
        stalls: StallSnapshot,
    ) -> Result<Self, EventError> {
        Self::at(action, duration, thread, heap_delta_bytes, stalls, Utc::now())
    }

    pub fn at(
        action: impl Into<String>,
        duration: Duration,
        thread: ThreadKind,
        heap_delta_bytes: i64,
        stalls: StallSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        let action = action.into();
        if action.trim().is_empty() {
            return Err(EventError::EmptyAction);
        }
        if !stalls.longest_ms.is_finite() || stalls.longest_ms < 0.0 {
            return Err(EventError::InvalidStall(stalls.longest_ms));
        }
        if (stalls.count == 0) != (stalls.longest_ms == 0.0) {
            return Err(EventError::InconsistentStalls {
                count: stalls.count,
                longest_ms: stalls.longest_ms,
            });
        }

        Ok(Self {
            action,
            duration,
            thread,
            heap_delta_bytes,
            stalls,
            timestamp,
        })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }

    pub fn thread(&self) -> ThreadKind {
        self.thread
    }

    pub fn heap_delta_bytes(&self) -> i64 {
        self.heap_delta_bytes
    }

    pub fn stalls(&self) -> StallSnapshot {
        self.stalls
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
