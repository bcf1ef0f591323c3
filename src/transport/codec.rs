//! Wire-envelope helpers: recursive ISO-8601 rehydration (§6 constraint) and
//! the `cloud-g1` canonical numeric stringifier consumed by
//! [`crate::terminal_state::hashes`] (§4.4 step 4).
//!
//! Packet payloads with a known shape (positions, orders, account
//! information, …) are deserialized straight into the typed structs in
//! [`crate::models`], where `chrono`'s serde integration rehydrates
//! ISO-8601 strings into `DateTime<Utc>` per field with no reflection
//! needed — the "typed, tagged-union deserializer" §9 recommends.
//! [`rehydrate_timestamps`] exists for the residual case: untyped, passed-
//! through JSON (e.g. broker-specific fields on a generic `update` packet)
//! where no Rust struct models the shape ahead of time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Recursively normalize every object value whose key matches `/time|Time/`
/// (contains the literal substring `"time"` or `"Time"`) from an ISO-8601
/// string into its UTC-normalized RFC 3339 form, at any nesting depth
/// through objects and arrays. Non-string values and unparsable strings are
/// left untouched.
pub fn rehydrate_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_time_key(key) {
                    if let Value::String(raw) = child {
                        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                            *raw = parsed.with_timezone(&Utc).to_rfc3339();
                            continue;
                        }
                    }
                }
                rehydrate_timestamps(child);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                rehydrate_timestamps(item);
            }
        }
        _ => {}
    }
}

fn is_time_key(key: &str) -> bool {
    key.contains("time") || key.contains("Time")
}

/// Keys whose numeric value the `cloud-g1` stringifier emits as a bare
/// integer instead of a quoted `toFixed(8)` string (§4.4 step 4).
#[must_use]
pub fn g1_integer_keys() -> HashSet<&'static str> {
    ["digits", "magic"].into_iter().collect()
}

/// Canonical `cloud-g1` stringifier: numbers are formatted with 8 decimal
/// places and quoted as strings, except under an "integer key"
/// ([`g1_integer_keys`]), which is emitted as a bare JSON integer.
#[must_use]
pub fn g1_stringify(value: &Value) -> String {
    g1_stringify_inner(value, &g1_integer_keys(), None)
}

fn g1_stringify_inner(value: &Value, integer_keys: &HashSet<&'static str>, key: Option<&str>) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if key.is_some_and(|k| integer_keys.contains(k)) {
                if let Some(i) = n.as_i64() {
                    return i.to_string();
                }
                return format!("{}", n.as_f64().unwrap_or(0.0) as i64);
            }
            format!("\"{:.8}\"", n.as_f64().unwrap_or(0.0))
        }
        Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| g1_stringify_inner(item, integer_keys, None))
                .collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key_json = serde_json::to_string(k).unwrap_or_else(|_| "\"\"".to_string());
                    format!("{key_json}:{}", g1_stringify_inner(v, integer_keys, Some(k)))
                })
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}
