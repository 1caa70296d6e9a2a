//! Redis reply rendering in `redis-cli` style

use redis::Value;
use serde_json::{Map, Value as JsonValue};

/// Render a reply as text
///
/// Arrays print one `N) item` line per element; nested arrays restart the
/// numbering inside the item rather than indenting.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Nil => "(nil)".to_string(),
        Value::Boolean(b) => String::from(if *b { "1" } else { "0" }),
        Value::Okay => "OK".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Double(f) => f.to_string(),
        Value::SimpleString(s) => s.clone(),
        Value::BulkString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::VerbatimString { text, .. } => text.clone(),
        Value::Array(items) | Value::Set(items) => format_items(items),
        Value::Push { data, .. } => format_items(data),
        Value::Map(_) => {
            serde_json::to_string_pretty(&to_json(value)).unwrap_or_else(|_| format!("{value:?}"))
        }
        Value::Attribute { data, .. } => format_value(data),
        other => format!("{other:?}"),
    }
}

fn format_items(items: &[Value]) -> String {
    if items.is_empty() {
        return "(empty array)".to_string();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}) {}", i + 1, format_value(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Structural JSON view of a reply, used for map replies
fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Nil => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(f.to_string())),
        Value::Array(items) | Value::Set(items) => {
            JsonValue::Array(items.iter().map(to_json).collect())
        }
        Value::Map(pairs) => {
            let mut map = Map::new();
            for (k, v) in pairs {
                map.insert(format_value(k), to_json(v));
            }
            JsonValue::Object(map)
        }
        other => JsonValue::String(format_value(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_nil() {
        assert_eq!(format_value(&Value::Nil), "(nil)");
    }

    #[test]
    fn test_array_numbering() {
        let value = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(format_value(&value), "1) 1\n2) 2");
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(format_value(&Value::Array(vec![])), "(empty array)");
    }

    #[test]
    fn test_booleans_and_status() {
        assert_eq!(format_value(&Value::Boolean(true)), "1");
        assert_eq!(format_value(&Value::Boolean(false)), "0");
        assert_eq!(format_value(&Value::Okay), "OK");
        assert_eq!(format_value(&Value::SimpleString("PONG".into())), "PONG");
    }

    #[test]
    fn test_nested_array_restarts_numbering() {
        let value = Value::Array(vec![bulk("a"), Value::Array(vec![bulk("b"), bulk("c")])]);
        assert_eq!(format_value(&value), "1) a\n2) 1) b\n2) c");
    }

    #[test]
    fn test_map_is_pretty_json() {
        let value = Value::Map(vec![(bulk("field"), Value::Int(3))]);
        assert_eq!(format_value(&value), "{\n  \"field\": 3\n}");
    }
}
