//! Tolerant accessors for loosely structured menu JSON

use serde_json::{Map, Value};

/// Collapse runs of whitespace and trim.
pub fn tidy(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First key holding a non-empty string (numbers are stringified).
pub fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(tidy(s)),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Numeric value from a JSON number or a price-like string ("$12.99", "1,299").
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// First key holding a numeric value.
pub fn number_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(*key).and_then(number))
}

/// Every JSON object in the document, depth-first.
pub fn walk_objects<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Object(map) => {
            out.push(map);
            for child in map.values() {
                walk_objects(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk_objects(child, out);
            }
        }
        _ => {}
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
