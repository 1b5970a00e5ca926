//! Helpers for preparing documents before they leave the process

use bson::{Bson, Document};
use serde_json::{Map, Number, Value};

use crate::field::UNDEFINED_MARKER;

/// Check whether a value is an undefined marker
pub fn is_undefined_value(value: &Bson) -> bool {
    match value {
        Bson::Undefined => true,
        Bson::Document(doc) => {
            doc.len() == 1 && matches!(doc.get(UNDEFINED_MARKER), Some(Bson::Boolean(true)))
        }
        _ => false,
    }
}

/// Drop every undefined value, descending into nested documents and arrays
pub fn exclude_undefined_values(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(_, value)| !is_undefined_value(value))
        .map(|(key, value)| (key, strip_undefined(value)))
        .collect()
}

fn strip_undefined(value: Bson) -> Bson {
    match value {
        Bson::Document(doc) => Bson::Document(exclude_undefined_values(doc)),
        Bson::Array(items) => Bson::Array(
            items
                .into_iter()
                .filter(|item| !is_undefined_value(item))
                .map(strip_undefined)
                .collect(),
        ),
        other => other,
    }
}

/// Drop top-level keys whose value is null
pub fn exclude_none_values(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(_, value)| !matches!(value, Bson::Null))
        .collect()
}

/// Drop top-level keys whose value is null or undefined
pub fn exclude_nullable_values(doc: Document) -> Document {
    exclude_none_values(exclude_undefined_values(doc))
}

/// Render a BSON value as plain JSON
///
/// Identifiers become hex strings and dates RFC 3339 strings. Undefined values
/// are omitted from documents.
pub fn to_plain_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(dt.to_chrono().to_rfc3339()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Int32(n) => Value::Number(n.into()),
        Bson::Int64(n) => Value::Number(n.into()),
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|item| !is_undefined_value(item))
                .map(to_plain_json)
                .collect(),
        ),
        Bson::Document(doc) => {
            let map: Map<String, Value> = exclude_undefined_values(doc)
                .into_iter()
                .map(|(key, value)| (key, to_plain_json(value)))
                .collect();
            Value::Object(map)
        }
        other => other.into_relaxed_extjson(),
    }
}
