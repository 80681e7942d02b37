use thiserror::Error;

// ─── Configuration ───────────────────────────────────────────────

/// Rejected configuration, reported at wiring time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error(
        "timeouts must satisfy connect ({connect_ms}ms) < request ({request_ms}ms) < total ({total_ms}ms)"
    )]
    TimeoutOrdering {
        connect_ms: u64,
        request_ms: u64,
        total_ms: u64,
    },

    #[error("invalid collector url \"{url}\": {reason}")]
    CollectorUrl { url: String, reason: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ─── Events ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("action name must not be empty")]
    EmptyAction,

    #[error("stall pair is inconsistent: count={count}, longest={longest_ms}ms")]
    InconsistentStalls { count: u64, longest_ms: f64 },

    #[error("longest stall must be finite and non-negative, got {0}")]
    InvalidStall(f64),
}

// ─── Scheduling ──────────────────────────────────────────────────

/// The periodic probe task could not be created.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("probe period must be greater than zero")]
    ZeroPeriod,
}

/// The primary context has shut down and no longer accepts tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("primary context is closed")]
pub struct ContextClosed;

// ─── Delivery setup ──────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

// ─── Collector metrics ───────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

// ─── Instrumented actions ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Closed(#[from] ContextClosed),

    #[error(transparent)]
    Event(#[from] EventError),
}
