//! JSON to record conversion.

use crate::error::{CodecError, CodecResult};
use crate::record::{Record, Value};

/// Convert a JSON value. `null` (and nulls inside arrays) have no record
/// form and yield `None`.
pub fn from_json(value: serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Boolean(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Integer(i)),
            None => n.as_f64().map(Value::Float),
        },
        serde_json::Value::String(s) => Some(Value::String(s)),
        serde_json::Value::Array(items) => {
            Some(Value::Array(items.into_iter().filter_map(from_json).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Table(
            map.into_iter()
                .filter_map(|(k, v)| from_json(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Datetime(d) => serde_json::Value::String(d.to_string()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Table(table) => record_to_json(table),
    }
}

/// Convert a JSON object into a record, dropping null fields.
pub fn record_from_json(value: serde_json::Value) -> CodecResult<Record> {
    match from_json(value) {
        Some(Value::Table(table)) => Ok(table),
        Some(other) => Err(CodecError::NotATable(other.type_str().to_string())),
        None => Err(CodecError::NotATable("null".into())),
    }
}

pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect(),
    )
}

/// Decode an object or an array of objects.
pub fn read_records(bytes: &[u8]) -> CodecResult<Vec<Record>> {
    match serde_json::from_slice(bytes)? {
        serde_json::Value::Array(items) => items.into_iter().map(record_from_json).collect(),
        other => Ok(vec![record_from_json(other)?]),
    }
}

/// Encode records as a pretty-printed JSON array.
pub fn write_records(records: &[Record]) -> CodecResult<Vec<u8>> {
    let array: Vec<_> = records.iter().map(record_to_json).collect();
    Ok(serde_json::to_vec_pretty(&array)?)
}
