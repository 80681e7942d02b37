//! JSON body for `POST /ingest`.
//!
//! `duration_ms` and `edt_longest_stall_ms` are written with exactly three
//! decimals; every other number is an integer. `ts` is UTC with millisecond
//! precision and a `Z` suffix.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use super::{ActionEvent, HostKind};

/// Content type sent with every ingest request.
pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// A float rendered as a fixed three-decimal JSON number.
#[derive(Debug, Clone, Copy)]
struct Fixed3(f64);

impl Serialize for Fixed3 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.0.is_finite() {
            return Err(S::Error::custom(format!("non-finite number {}", self.0)));
        }
        let raw = RawValue::from_string(format!("{:.3}", self.0)).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

#[derive(Serialize)]
struct WireEvent<'a> {
    action: &'a str,
    duration_ms: Fixed3,
    thread: &'static str,
    heap_delta_bytes: i64,
    edt_stalls: u64,
    edt_longest_stall_ms: Fixed3,
    ts: String,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes `event` with the thread label of `host`.
pub fn encode(event: &ActionEvent, host: HostKind) -> Result<Vec<u8>, serde_json::Error> {
    let stalls = event.stalls();
    serde_json::to_vec(&WireEvent {
        action: event.action(),
        duration_ms: Fixed3(event.duration_ms()),
        thread: host.thread_label(event.thread()),
        heap_delta_bytes: event.heap_delta_bytes(),
        edt_stalls: stalls.count,
        edt_longest_stall_ms: Fixed3(stalls.longest_ms),
        ts: format_timestamp(&event.timestamp()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::StallSnapshot;
    use crate::telemetry::ThreadKind;
    use chrono::TimeZone;
    use std::time::Duration;

    fn event(duration: Duration, thread: ThreadKind, stalls: StallSnapshot) -> ActionEvent {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(42);
        ActionEvent::at("FreezeGuard.BadBlockingAction", duration, thread, 16_384, stalls, ts)
            .unwrap()
    }

    fn encode_str(event: &ActionEvent, host: HostKind) -> String {
        String::from_utf8(encode(event, host).unwrap()).unwrap()
    }

    #[test]
    fn body_has_the_fixed_field_order_and_formats() {
        let stalls = StallSnapshot {
            count: 24,
            longest_ms: 1203.0,
        };
        let body = encode_str(
            &event(Duration::from_millis(1500), ThreadKind::Primary, stalls),
            HostKind::IntelliJ,
        );
        assert_eq!(
            body,
            r#"{"action":"FreezeGuard.BadBlockingAction","duration_ms":1500.000,"thread":"EDT","heap_delta_bytes":16384,"edt_stalls":24,"edt_longest_stall_ms":1203.000,"ts":"2024-01-01T12:00:00.042Z"}"#
        );
    }

    #[test]
    fn duration_keeps_exactly_three_decimals() {
        let body = encode_str(
            &event(
                Duration::from_nanos(1_205_333_333),
                ThreadKind::Primary,
                StallSnapshot::EMPTY,
            ),
            HostKind::VsCode,
        );
        assert!(body.contains(r#""duration_ms":1205.333,"#), "{body}");
        assert!(body.contains(r#""edt_longest_stall_ms":0.000,"#), "{body}");
        assert!(body.contains(r#""thread":"MAIN""#), "{body}");
    }

    #[test]
    fn body_parses_back_as_plain_json() {
        let body = encode(
            &event(
                Duration::from_micros(2_500),
                ThreadKind::Offloaded,
                StallSnapshot::EMPTY,
            ),
            HostKind::VsCode,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["thread"], "WORKER");
        assert_eq!(value["duration_ms"].as_f64(), Some(2.5));
        assert_eq!(value["edt_stalls"].as_u64(), Some(0));
    }

    #[test]
    fn action_names_are_escaped() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = ActionEvent::at(
            "say \"hi\"",
            Duration::ZERO,
            ThreadKind::Primary,
            0,
            StallSnapshot::EMPTY,
            ts,
        )
        .unwrap();
        let body = encode_str(&event, HostKind::IntelliJ);
        assert!(body.starts_with(r#"{"action":"say \"hi\"","#), "{body}");
        assert!(body.ends_with(r#""ts":"2024-01-01T00:00:00.000Z"}"#), "{body}");
    }
}
