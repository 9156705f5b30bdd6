//! Secret redaction for event payloads.

use serde_json::{Map, Value};

pub const REDACTED: &str = "***REDACTED***";

const SECRET_KEYS: [&str; 5] = ["api_key", "token", "authorization", "password", "secret"];

/// Replace values stored under secret-looking keys, at any depth.
///
/// Key matching is exact after lowercasing; nested objects and arrays are
/// walked recursively.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, inner) in map {
                let replaced = if is_secret_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact(inner)
                };
                out.insert(key.clone(), replaced);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SECRET_KEYS.contains(&lowered.as_str())
}
