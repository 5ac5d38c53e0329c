//! JSON Field Parser
//!
//! Flattens nested objects and arrays into dot-separated keys:
//!
//! ```text
//! {"req": {"path": "/", "ms": 12}, "tags": ["a", "b"]}
//!   → req.path = "/", req.ms = 12.0, tags.0 = "a", tags.1 = "b"
//! ```
//!
//! All numbers become `Value::Number`.

use super::FieldParser;
use crate::log::{Fields, Value};
use serde_json::Value as JsonValue;

/// JSON parser producing flattened fields
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl FieldParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn try_parse(&self, input: &str) -> Option<Fields> {
        let value: JsonValue = serde_json::from_str(input.trim()).ok()?;

        match value {
            JsonValue::Object(_) | JsonValue::Array(_) => {
                let mut fields = Fields::new();
                flatten("", &value, &mut fields);
                Some(fields)
            }
            _ => None,
        }
    }
}

fn flatten(prefix: &str, value: &JsonValue, fields: &mut Fields) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                flatten(&join_key(prefix, key), child, fields);
            }
        }
        JsonValue::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                flatten(&join_key(prefix, &idx.to_string()), child, fields);
            }
        }
        JsonValue::Null => {
            fields.insert(prefix.to_string(), Value::Null);
        }
        JsonValue::Bool(b) => {
            fields.insert(prefix.to_string(), Value::Bool(*b));
        }
        JsonValue::Number(n) => {
            let number = n.as_f64().map(Value::Number).unwrap_or(Value::Null);
            fields.insert(prefix.to_string(), number);
        }
        JsonValue::String(s) => {
            fields.insert(prefix.to_string(), Value::String(s.clone()));
        }
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_object() {
        let fields = JsonParser.try_parse(r#"{"a":{"b":1}}"#).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["a.b"], Value::Number(1.0));
    }

    #[test]
    fn test_arrays_and_scalars() {
        let fields = JsonParser
            .try_parse(r#"{"level":"warn","ok":false,"tags":["x",{"k":null}],"ms":12.5}"#)
            .unwrap();

        assert_eq!(fields["level"], Value::from("warn"));
        assert_eq!(fields["ok"], Value::Bool(false));
        assert_eq!(fields["tags.0"], Value::from("x"));
        assert!(fields["tags.1.k"].is_null());
        assert_eq!(fields["ms"], Value::Number(12.5));
    }

    #[test]
    fn test_rejects_non_containers_and_garbage() {
        assert!(JsonParser.try_parse("42").is_none());
        assert!(JsonParser.try_parse(r#""text""#).is_none());
        assert!(JsonParser.try_parse("{broken").is_none());
        assert!(JsonParser.try_parse("plain log line").is_none());
    }
}
