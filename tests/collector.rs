//! The reference collector's HTTP contract.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use freeze_guard::collector::{self, EventStore};

struct Collector {
    base: String,
    store: Arc<EventStore>,
    client: Client,
}

impl Collector {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let store = Arc::new(EventStore::new().unwrap());
        tokio::spawn(collector::serve(listener, store.clone()));
        Self {
            base: format!("http://{addr}"),
            store,
            client: Client::builder().no_proxy().build().unwrap(),
        }
    }

    async fn ingest(&self, body: impl Into<String>) -> Response {
        self.client
            .post(format!("{}/ingest", self.base))
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(body.into())
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap()
    }
}

async fn json_body(response: Response) -> Value {
    serde_json::from_str(&response.text().await.unwrap()).unwrap()
}

fn event(action: &str, thread: &str, duration_ms: f64, stalls: u64, longest_ms: f64) -> String {
    json!({
        "action": action,
        "duration_ms": duration_ms,
        "thread": thread,
        "heap_delta_bytes": 1024,
        "edt_stalls": stalls,
        "edt_longest_stall_ms": longest_ms,
        "ts": "2024-05-01T08:30:00.000Z",
    })
    .to_string()
}

// ─── /ingest ─────────────────────────────────────────────────────

#[tokio::test]
async fn valid_events_are_accepted() {
    let collector = Collector::start().await;

    let response = collector
        .ingest(event("FreezeGuard.BadBlockingAction", "EDT", 1205.333, 23, 1201.0))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(json_body(response).await, json!({ "ok": true }));
    assert_eq!(collector.store.total_events(), 1);
}

#[tokio::test]
async fn stall_fields_default_to_zero() {
    let collector = Collector::start().await;

    let body = r#"{"action":"a","duration_ms":1.5,"thread":"MAIN","ts":"2024-05-01T08:30:00Z"}"#;
    assert_eq!(collector.ingest(body).await.status(), 200);

    let record = &collector.store.recent(1)[0];
    assert_eq!(record.edt_stalls, 0);
    assert_eq!(record.edt_longest_stall_ms, 0.0);
    assert_eq!(record.heap_delta_bytes, 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let collector = Collector::start().await;

    let response = collector.ingest("{not json").await;
    assert_eq!(response.status(), 400);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().starts_with("json parse: "));
    assert_eq!(body["raw"], "{not json");
    assert_eq!(collector.store.total_events(), 0);
}

#[tokio::test]
async fn schema_violations_are_unprocessable() {
    let collector = Collector::start().await;

    let missing_action = r#"{"duration_ms":1.0,"thread":"EDT","ts":"2024-05-01T08:30:00Z"}"#;
    let response = collector.ingest(missing_action).await;
    assert_eq!(response.status(), 422);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("model: "));
    assert_eq!(body["data"]["thread"], "EDT");

    let unknown_thread = event("a", "UI", 1.0, 0, 0.0);
    assert_eq!(collector.ingest(unknown_thread).await.status(), 422);

    let bad_timestamp = r#"{"action":"a","duration_ms":1.0,"thread":"EDT","ts":"yesterday"}"#;
    assert_eq!(collector.ingest(bad_timestamp).await.status(), 422);

    assert_eq!(collector.store.total_events(), 0);
}

// ─── /metrics ────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_use_the_text_exposition_format() {
    let collector = Collector::start().await;
    collector
        .ingest(event("FreezeGuard.BadBlockingAction", "EDT", 1205.333, 23, 1201.0))
        .await;
    collector
        .ingest(event("FreezeGuard.BackgroundFixAction", "BGT", 1210.0, 0, 0.0))
        .await;

    let response = collector.get("/metrics").await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let text = response.text().await.unwrap();
    for family in [
        "action_duration_seconds",
        "edt_stall_duration_seconds",
        "edt_stalls_total",
        "events_total",
        "heap_delta_bytes",
    ] {
        assert!(text.contains(&format!("# HELP {family} ")), "{family}:\n{text}");
        assert!(text.contains(&format!("# TYPE {family} ")), "{family}:\n{text}");
    }
    assert!(text.contains(r#"edt_stalls_total{action="FreezeGuard.BadBlockingAction"} 23"#));
    assert!(text.contains(r#"events_total{action="FreezeGuard.BackgroundFixAction",thread="BGT"} 1"#));
}

#[tokio::test]
async fn metrics_before_any_event_are_empty() {
    let collector = Collector::start().await;
    let response = collector.get("/metrics").await;
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(!text.contains("events_total{"), "{text}");
}

#[tokio::test]
async fn label_values_are_escaped() {
    let collector = Collector::start().await;
    collector.ingest(event(r#"say "hi""#, "EDT", 5.0, 0, 0.0)).await;

    let text = collector.get("/metrics").await.text().await.unwrap();
    assert!(text.contains(r#"events_total{action="say \"hi\"",thread="EDT"} 1"#), "{text}");
}

// ─── /report and /debug ──────────────────────────────────────────

#[tokio::test]
async fn report_before_any_event() {
    let collector = Collector::start().await;
    let response = collector.get("/report").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "(no events yet)");
}

#[tokio::test]
async fn report_lists_recent_events() {
    let collector = Collector::start().await;
    collector.ingest(event("first.action", "EDT", 10.0, 0, 0.0)).await;
    collector.ingest(event("second.action", "BGT", 20.0, 0, 0.0)).await;

    let text = collector.get("/report").await.text().await.unwrap();
    let first = text.find("first.action").unwrap();
    let second = text.find("second.action").unwrap();
    assert!(first < second, "{text}");
    assert!(text.contains("p95 ms"));
}

#[tokio::test]
async fn debug_returns_totals_and_recent_events() {
    let collector = Collector::start().await;
    collector.ingest(event("a", "MAIN", 10.0, 0, 0.0)).await;
    collector.ingest(event("b", "WORKER", 20.0, 0, 0.0)).await;

    let body = json_body(collector.get("/debug").await).await;
    assert_eq!(body["total_events"], 2);
    let recent = body["recent_events"].as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1]["action"], "b");
    assert_eq!(recent[1]["thread"], "WORKER");
}

#[tokio::test]
async fn responses_carry_timing_headers() {
    let collector = Collector::start().await;
    let response = collector.get("/debug").await;

    let micros = response.headers()["x-response-time-us"].to_str().unwrap();
    assert!(micros.parse::<u64>().is_ok());
    let server_timing = response.headers()["server-timing"].to_str().unwrap();
    assert!(server_timing.starts_with("total;dur="));
}
