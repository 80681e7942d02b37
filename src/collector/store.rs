use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use super::percentiles::PercentileSet;
use crate::error::MetricsError;
use crate::telemetry::{HostKind, THREAD_LABELS};

// ─── Configuration ───────────────────────────────────────────────

/// How many ingested events `/debug` and `/report` can look back on
const RING_CAPACITY: usize = 256;

/// Seconds, tuned for UI actions (10 ms .. 10 s)
const ACTION_DURATION_BUCKETS: &[f64] = &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.0, 5.0, 10.0];

/// Seconds
const STALL_DURATION_BUCKETS: &[f64] = &[0.100, 0.250, 0.500, 1.0, 2.0, 5.0];

const HEAP_DELTA_BUCKETS: &[f64] = &[
    -50_000_000.0,
    -10_000_000.0,
    -1_000_000.0,
    -100_000.0,
    -10_000.0,
    0.0,
    10_000.0,
    100_000.0,
    1_000_000.0,
    10_000_000.0,
    50_000_000.0,
];

/// HdrHistogram range for durations: 1 μs → 10 min, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// One `/ingest` body as the collector understands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub action: String,
    pub duration_ms: f64,
    pub thread: String,
    #[serde(default)]
    pub heap_delta_bytes: i64,
    #[serde(default)]
    pub edt_stalls: u64,
    #[serde(default)]
    pub edt_longest_stall_ms: f64,
    pub ts: DateTime<Utc>,
}

impl IngestRecord {
    /// Checks what the schema alone cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if HostKind::from_thread_label(&self.thread).is_none() {
            return Err(format!(
                "thread must be one of {}, got \"{}\"",
                THREAD_LABELS.join(", "),
                self.thread
            ));
        }
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(format!("duration_ms must be a non-negative number, got {}", self.duration_ms));
        }
        if !self.edt_longest_stall_ms.is_finite() {
            return Err("edt_longest_stall_ms must be finite".into());
        }
        Ok(())
    }
}

/// Per-action duration percentiles for `/report`.
#[derive(Debug, Clone)]
pub struct DurationSummary {
    pub action: String,
    pub thread: String,
    pub duration: PercentileSet,
}

/// Thread-safe store behind the collector routes.
///
/// Prometheus families live on a registry owned by the store, so several
/// collectors in one process never share series.
pub struct EventStore {
    registry: Registry,
    metrics: CollectorMetrics,
    inner: Mutex<Inner>,
}

// ─── Prometheus families ─────────────────────────────────────────

#[derive(Clone)]
struct CollectorMetrics {
    action_duration: HistogramVec,
    stall_duration: HistogramVec,
    stalls_total: IntCounterVec,
    events_total: IntCounterVec,
    heap_delta: HistogramVec,
}

impl CollectorMetrics {
    fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let action_duration = HistogramVec::new(
            HistogramOpts::new("action_duration_seconds", "Action duration in seconds")
                .buckets(ACTION_DURATION_BUCKETS.to_vec()),
            &["action", "thread"],
        )?;
        registry.register(Box::new(action_duration.clone()))?;

        let stall_duration = HistogramVec::new(
            HistogramOpts::new(
                "edt_stall_duration_seconds",
                "Observed primary-context stall (longest in event window), seconds",
            )
            .buckets(STALL_DURATION_BUCKETS.to_vec()),
            &["action"],
        )?;
        registry.register(Box::new(stall_duration.clone()))?;

        let stalls_total = IntCounterVec::new(
            Opts::new("edt_stalls_total", "Count of primary-context stall events observed"),
            &["action"],
        )?;
        registry.register(Box::new(stalls_total.clone()))?;

        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Number of events ingested"),
            &["action", "thread"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let heap_delta = HistogramVec::new(
            HistogramOpts::new("heap_delta_bytes", "Memory allocation delta in bytes per action")
                .buckets(HEAP_DELTA_BUCKETS.to_vec()),
            &["action", "thread"],
        )?;
        registry.register(Box::new(heap_delta.clone()))?;

        Ok(Self {
            action_duration,
            stall_duration,
            stalls_total,
            events_total,
            heap_delta,
        })
    }

    fn observe(&self, record: &IngestRecord) {
        let labels = [record.action.as_str(), record.thread.as_str()];
        self.events_total.with_label_values(&labels).inc();
        self.action_duration
            .with_label_values(&labels)
            .observe(record.duration_ms / 1_000.0);
        if record.heap_delta_bytes != 0 {
            self.heap_delta
                .with_label_values(&labels)
                .observe(record.heap_delta_bytes as f64);
        }

        let action = [record.action.as_str()];
        if record.edt_longest_stall_ms > 0.0 {
            self.stall_duration
                .with_label_values(&action)
                .observe(record.edt_longest_stall_ms / 1_000.0);
        }
        if record.edt_stalls > 0 {
            self.stalls_total
                .with_label_values(&action)
                .inc_by(record.edt_stalls);
        }
    }
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    recent: VecDeque<IngestRecord>,
    total_events: u64,
    /// Microsecond durations keyed by (action, thread)
    durations: BTreeMap<(String, String), Histogram<u64>>,
}

// ─── EventStore impl ─────────────────────────────────────────────

impl EventStore {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let metrics = CollectorMetrics::new(&registry)?;
        Ok(Self {
            registry,
            metrics,
            inner: Mutex::new(Inner {
                recent: VecDeque::with_capacity(RING_CAPACITY + 1),
                total_events: 0,
                durations: BTreeMap::new(),
            }),
        })
    }

    /// Record one validated event.
    pub fn record(&self, record: IngestRecord) {
        self.metrics.observe(&record);
        self.inner.lock().record(record);
    }

    pub fn total_events(&self) -> u64 {
        self.inner.lock().total_events
    }

    /// The newest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<IngestRecord> {
        let inner = self.inner.lock();
        let skip = inner.recent.len().saturating_sub(limit);
        inner.recent.iter().skip(skip).cloned().collect()
    }

    pub fn duration_summaries(&self) -> Vec<DurationSummary> {
        let inner = self.inner.lock();
        inner
            .durations
            .iter()
            .map(|((action, thread), hist)| DurationSummary {
                action: action.clone(),
                thread: thread.clone(),
                duration: PercentileSet::from_histogram(hist),
            })
            .collect()
    }

    /// Encodes every family with at least one series in Prometheus text format.
    pub fn encode_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn record(&mut self, record: IngestRecord) {
        self.total_events += 1;

        let hist = self
            .durations
            .entry((record.action.clone(), record.thread.clone()))
            .or_insert_with(|| {
                Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                    .expect("histogram bounds are valid")
            });
        let micros = (record.duration_ms * 1_000.0).round().max(1.0) as u64;
        let _ = hist.record(micros.min(HIST_HIGH));

        self.recent.push_back(record);
        if self.recent.len() > RING_CAPACITY {
            self.recent.pop_front();
        }
    }
}
