use std::fmt::Write as _;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::store::{EventStore, IngestRecord};

/// Lines shown by `/report`
const REPORT_LINES: usize = 50;

// ─── Error type ──────────────────────────────────────────────────

#[derive(Debug)]
pub enum IngestError {
    /// Body is not JSON at all
    Malformed { error: String, raw: String },
    /// JSON that does not fit the event schema
    Invalid { error: String, data: Value },
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Malformed { error, raw } => (
                StatusCode::BAD_REQUEST,
                json!({ "ok": false, "error": format!("json parse: {error}"), "raw": raw }),
            ),
            Self::Invalid { error, data } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "ok": false, "error": format!("model: {error}"), "data": data }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

// ─── POST /ingest ────────────────────────────────────────────────

/// Parses the body as JSON whatever the content type says.
pub async fn ingest(
    State(store): State<Arc<EventStore>>,
    body: Bytes,
) -> Result<Json<Value>, IngestError> {
    let data: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "ingest body is not json");
        IngestError::Malformed {
            error: e.to_string(),
            raw: String::from_utf8_lossy(&body).into_owned(),
        }
    })?;

    let record = serde_json::from_value::<IngestRecord>(data.clone())
        .map_err(|e| e.to_string())
        .and_then(|record| record.validate().map(|()| record))
        .map_err(|error| {
            warn!(%error, "ingest body rejected");
            IngestError::Invalid { error, data }
        })?;

    info!(
        action = %record.action,
        thread = %record.thread,
        duration_ms = record.duration_ms,
        stalls = record.edt_stalls,
        "event ingested"
    );
    store.record(record);

    Ok(Json(json!({ "ok": true })))
}

// ─── GET /metrics ────────────────────────────────────────────────

/// Prometheus text exposition, version 0.0.4.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn metrics(State(store): State<Arc<EventStore>>) -> Response {
    match store.encode_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ─── GET /report ─────────────────────────────────────────────────

/// Human-readable tail of recent events plus duration percentiles.
pub async fn report(State(store): State<Arc<EventStore>>) -> String {
    let recent = store.recent(REPORT_LINES);
    if recent.is_empty() {
        return "(no events yet)".into();
    }

    let mut out = String::new();
    for ev in &recent {
        let _ = writeln!(
            out,
            "{}  {:<32} {:<6} {:9.1} ms  stalls={} longest={:7.1} ms  heapΔ={}",
            ev.ts.to_rfc3339(),
            ev.action,
            ev.thread,
            ev.duration_ms,
            ev.edt_stalls,
            ev.edt_longest_stall_ms,
            ev.heap_delta_bytes,
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<32} {:<6} {:>6} {:>9} {:>9} {:>9}",
        "action", "thread", "n", "p50 ms", "p95 ms", "max ms"
    );
    for s in store.duration_summaries() {
        let _ = writeln!(
            out,
            "{:<32} {:<6} {:>6} {:>9.1} {:>9.1} {:>9.1}",
            s.action, s.thread, s.duration.count, s.duration.p50_ms, s.duration.p95_ms, s.duration.max_ms,
        );
    }

    out.trim_end().to_owned()
}

// ─── GET /debug ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DebugView {
    pub total_events: u64,
    pub recent_events: Vec<IngestRecord>,
}

pub async fn debug(State(store): State<Arc<EventStore>>) -> Json<DebugView> {
    Json(DebugView {
        total_events: store.total_events(),
        recent_events: store.recent(usize::MAX),
    })
}
