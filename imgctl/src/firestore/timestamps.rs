//! Normalization of the timestamp shapes found in prompt records.
//!
//! Records written by different clients store creation time differently: a native Firestore
//! timestamp, a `{seconds, nanos}` map (or the `{_seconds, _nanoseconds}` form some SDKs
//! serialize), epoch seconds as a number, or an ISO string. All of them come out as RFC 3339.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Normalize a Firestore field value to RFC 3339, substituting `now` when the value is missing or
/// unreadable.
pub fn normalize(value: Option<&Value>, now: DateTime<Utc>) -> String {
    match value.and_then(parse) {
        Some(ts) => ts.to_rfc3339(),
        None => {
            debug!(?value, "No usable creation time on record, substituting current time");
            now.to_rfc3339()
        }
    }
}

fn parse(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => from_epoch_secs(n.as_f64()?),
        Value::Object(map) => {
            if let Some(ts) = map.get("timestampValue").and_then(Value::as_str) {
                return parse_str(ts);
            }
            if let Some(s) = map.get("stringValue").and_then(Value::as_str) {
                return parse_str(s);
            }
            if let Some(i) = map.get("integerValue") {
                return from_epoch_secs(as_number(i)?);
            }
            if let Some(d) = map.get("doubleValue").and_then(Value::as_f64) {
                return from_epoch_secs(d);
            }
            if let Some(fields) = map.get("mapValue").and_then(|m| m.get("fields")) {
                return parse_seconds_map(fields);
            }
            parse_seconds_map(value)
        }
        _ => None,
    }
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim()).ok().map(|ts| ts.with_timezone(&Utc))
}

fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// `{seconds, nanos}` and friends. Values may be plain numbers, numeric strings, or Firestore
/// `integerValue` wrappers.
fn parse_seconds_map(fields: &Value) -> Option<DateTime<Utc>> {
    let map = fields.as_object()?;
    let seconds = ["seconds", "_seconds"].iter().find_map(|k| map.get(*k)).and_then(as_number)?;
    let nanos = ["nanos", "nanoseconds", "_nanoseconds"]
        .iter()
        .find_map(|k| map.get(*k))
        .and_then(as_number)
        .unwrap_or(0.0);
    DateTime::from_timestamp(seconds as i64, nanos.clamp(0.0, 999_999_999.0) as u32)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map
            .get("integerValue")
            .or_else(|| map.get("doubleValue"))
            .and_then(as_number),
        _ => None,
    }
}
