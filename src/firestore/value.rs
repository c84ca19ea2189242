//! Firestore typed-value JSON codec
//!
//! The REST API wraps every field in a typed envelope
//! (`{"stringValue": "x"}`, `{"integerValue": "42"}`, `{"mapValue": {...}}`).
//! Models work with plain JSON, so documents are converted on the way in and
//! out. Timestamps come back as RFC 3339 strings, which is what `chrono`
//! deserializes from.

use super::Fields;
use crate::error::FirestoreError;
use serde_json::{json, Map, Value};

/// Wrap a plain JSON value in its Firestore envelope
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode every field of a document
pub fn encode_fields(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Unwrap a Firestore envelope into plain JSON
pub fn decode_value(value: &Value) -> Result<Value, FirestoreError> {
    let Some(envelope) = value.as_object() else {
        return Err(FirestoreError::InvalidData(format!("expected typed value, got {}", value)));
    };
    let Some((kind, inner)) = envelope.iter().next() else {
        return Err(FirestoreError::InvalidData("empty typed value".to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "doubleValue" => Ok(inner.clone()),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| FirestoreError::InvalidData(format!("integerValue {}: {}", s, e))),
            Value::Number(_) => Ok(inner.clone()),
            other => Err(FirestoreError::InvalidData(format!("integerValue {}", other))),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = match inner.get("fields").and_then(Value::as_object) {
                Some(fields) => decode_fields(fields)?,
                None => Fields::new(),
            };
            Ok(Value::Object(fields))
        }
        other => Err(FirestoreError::InvalidData(format!("unsupported value type {}", other))),
    }
}

/// Decode the `fields` object of a REST document
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Fields, FirestoreError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}
