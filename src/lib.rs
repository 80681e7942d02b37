//! Detects when a host IDE's UI thread stalls and reports per-action timing,
//! memory deltas and stall statistics to a telemetry collector.
//!
//! - [`monitor`]: the stall prober and its scheduling/primary-context seams
//! - [`telemetry`]: the event record, wire format and fire-and-forget sender
//! - [`actions`]: instrumented-action glue tying the two together
//! - [`guard`]: the process root that owns the single monitor and sender
//! - [`collector`]: a reference collector speaking the same HTTP contract

pub mod actions;
pub mod collector;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod monitor;
pub mod telemetry;

pub use actions::{ActionRunner, HeapGauge, ResidentMemoryGauge};
pub use config::{GuardConfig, MonitorConfig, SenderConfig};
pub use guard::FreezeGuard;
pub use monitor::{StallMonitor, StallSnapshot};
pub use telemetry::{ActionEvent, EventSender, HostKind, ThreadKind};
