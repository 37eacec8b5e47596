//! `serde_json` <-> [`Value`] conversion for loading rows and exporting results.

use crate::Value;

/// Convert serde_json::Value to a runtime Value
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Object(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Convert JSON array rows into a list of Values; a non-array becomes one row.
pub fn json_rows(v: serde_json::Value) -> Vec<Value> {
    match json_to_value(v) {
        Value::Array(rows) => rows,
        single => vec![single],
    }
}

/// Convert a runtime Value to serde_json::Value
///
/// Groups become `{"key": ..., "elements": [...]}` objects.
pub fn value_to_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(b),
        Value::Integer(i) => serde_json::Value::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s),
        Value::Array(arr) => serde_json::Value::Array(arr.into_iter().map(value_to_json).collect()),
        Value::Object(obj) => serde_json::Value::Object(
            obj.into_iter().map(|(k, v)| (k, value_to_json(v))).collect(),
        ),
        Value::Group { key, elements } => {
            let mut obj = serde_json::Map::new();
            obj.insert("key".to_string(), value_to_json(*key));
            obj.insert(
                "elements".to_string(),
                serde_json::Value::Array(elements.into_iter().map(value_to_json).collect()),
            );
            serde_json::Value::Object(obj)
        }
    }
}
