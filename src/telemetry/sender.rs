use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::{wire, ActionEvent};
use crate::config::SenderConfig;
use crate::error::{ConfigError, SenderError};

/// Returned by [`EventSender::ping`] when the collector cannot be reached.
pub const PING_UNREACHABLE: i32 = -1;

/// Response bodies longer than this are cut before logging.
const BODY_EXCERPT_CHARS: usize = 256;

// ─── Outcome ─────────────────────────────────────────────────────

/// Terminal outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx from the collector
    Delivered { status: u16 },
    /// Non-2xx; never retried
    Rejected { status: u16, body: String },
    /// Connect error, reset, or any other transport failure
    Transport { error: String },
    /// A connect, request or total timeout elapsed
    TimedOut { after: Duration },
    /// The event could not be serialized
    Unencodable { error: String },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Short tag written to the `outcome` log field.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Rejected { .. } => "rejected",
            Self::Transport { .. } => "transport",
            Self::TimedOut { .. } => "timeout",
            Self::Unencodable { .. } => "encode",
        }
    }

    /// Emits the single log line for this outcome.
    pub fn log(&self, action: &str, thread: &str) {
        let outcome = self.outcome();
        match self {
            Self::Delivered { status } => {
                info!(action, thread, status, outcome, "telemetry delivered")
            }
            Self::Rejected { status, body } => {
                warn!(action, thread, status, outcome, body = %body, "telemetry rejected")
            }
            Self::Transport { error } => {
                warn!(action, thread, outcome, error = %error, "telemetry transport failure")
            }
            Self::TimedOut { after } => {
                let after_ms = after.as_millis() as u64;
                warn!(action, thread, outcome, after_ms, "telemetry timed out")
            }
            Self::Unencodable { error } => {
                error!(action, thread, outcome, error = %error, "telemetry event not encodable")
            }
        }
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_owned(),
    }
}

// ─── Sender ──────────────────────────────────────────────────────

/// Best-effort, non-blocking delivery of [`ActionEvent`]s to the collector.
///
/// Cheap to clone; all clones share one HTTP client and connection pool.
#[derive(Clone)]
pub struct EventSender {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    ingest_url: Url,
    metrics_url: Url,
    config: SenderConfig,
    runtime: Handle,
}

impl EventSender {
    /// Builds the shared client. Deliveries run on `runtime`.
    pub fn new(config: SenderConfig, runtime: Handle) -> Result<Self, SenderError> {
        config.validate()?;

        let base = base_with_trailing_slash(config.collector_url()?);
        let join = |path: &str| {
            base.join(path).map_err(|e| ConfigError::CollectorUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })
        };
        let ingest_url = join("ingest")?;
        let metrics_url = join("metrics")?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .http1_only()
            .no_proxy()
            .pool_max_idle_per_host(2)
            .build()?;

        debug!(ingest = %ingest_url, "telemetry sender ready");

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                ingest_url,
                metrics_url,
                config,
                runtime,
            }),
        })
    }

    /// Like [`new`](Self::new), bound to the calling context's runtime.
    pub fn from_current(config: SenderConfig) -> Result<Self, SenderError> {
        Self::new(config, Handle::try_current()?)
    }

    pub fn config(&self) -> &SenderConfig {
        &self.inner.config
    }

    /// `GET /metrics`; resolves to the status code, or
    /// [`PING_UNREACHABLE`] on transport failure or timeout.
    pub async fn ping(&self) -> i32 {
        let config = &self.inner.config;
        let request = self
            .inner
            .client
            .get(self.inner.metrics_url.clone())
            .timeout(config.ping_timeout())
            .send();

        match tokio::time::timeout(config.total_timeout(), request).await {
            Ok(Ok(response)) => i32::from(response.status().as_u16()),
            Ok(Err(e)) => {
                debug!(error = %e, "collector ping failed");
                PING_UNREACHABLE
            }
            Err(_) => {
                debug!("collector ping timed out");
                PING_UNREACHABLE
            }
        }
    }

    /// Fire-and-forget: spawns the delivery and returns immediately.
    ///
    /// The outcome is only logged; nothing is returned or raised.
    pub fn send_async(&self, event: ActionEvent) {
        let sender = self.clone();
        self.inner.runtime.spawn(async move {
            let delivery = sender.deliver(&event).await;
            let thread = sender.inner.config.host.thread_label(event.thread());
            delivery.log(event.action(), thread);
        });
    }

    /// One delivery attempt bounded by the total timeout.
    pub async fn deliver(&self, event: &ActionEvent) -> Delivery {
        let body = match wire::encode(event, self.inner.config.host) {
            Ok(body) => body,
            Err(e) => {
                return Delivery::Unencodable {
                    error: e.to_string(),
                }
            }
        };

        let total = self.inner.config.total_timeout();
        match tokio::time::timeout(total, self.exchange(body)).await {
            Ok(delivery) => delivery,
            Err(_) => Delivery::TimedOut { after: total },
        }
    }

    async fn exchange(&self, body: Vec<u8>) -> Delivery {
        let started = Instant::now();
        let sent = self
            .inner
            .client
            .post(self.inner.ingest_url.clone())
            .header(CONTENT_TYPE, wire::CONTENT_TYPE)
            .body(body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Delivery::TimedOut {
                    after: started.elapsed(),
                }
            }
            Err(e) => {
                return Delivery::Transport {
                    error: e.to_string(),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            return Delivery::Delivered {
                status: status.as_u16(),
            };
        }

        let body = response.text().await.unwrap_or_default();
        Delivery::Rejected {
            status: status.as_u16(),
            body: excerpt(&body),
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("ingest_url", &self.inner.ingest_url.as_str())
            .field("host", &self.inner.config.host)
            .finish()
    }
}

fn base_with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
