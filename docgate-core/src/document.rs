//! Schema-less document representation and JSON/BSON conversion.
//!
//! Documents travel as JSON at the HTTP boundary and as BSON inside the stores.
//! Every stored document carries a gateway-assigned UUID under [`ID_FIELD`]; on
//! the way out it is rendered as a hyphenated string.

use bson::{Bson, DateTime, Document, Uuid, oid::ObjectId, spec::BinarySubtype};
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field holding the store-assigned identifier.
pub const ID_FIELD: &str = "_id";
/// Creation stamp written when timestamps are enabled.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Modification stamp written when timestamps are enabled.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

const MAX_FIELD_LEN: usize = 128;

/// Generates a fresh document identifier.
pub fn new_id() -> Uuid {
    Uuid::new()
}

/// Parses a caller-supplied identifier.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidId`] if `raw` is not a UUID.
pub fn parse_id(raw: &str) -> DocumentStoreResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| DocumentStoreError::InvalidId(raw.to_string()))
}

/// Extracts the identifier from a stored document, if it carries one.
pub fn document_id(document: &Document) -> Option<Uuid> {
    match document.get(ID_FIELD)? {
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => {
            <[u8; 16]>::try_from(binary.bytes.as_slice())
                .ok()
                .map(Uuid::from_bytes)
        }
        Bson::String(raw) => Uuid::parse_str(raw).ok(),
        _ => None,
    }
}

/// Checks that a field name is usable in filters, sorts, projections and upsert keys.
///
/// Field names address top-level keys only: they must be non-empty, must not start
/// with `$` and must not contain `.` or NUL.
pub fn validate_field_name(field: &str) -> DocumentStoreResult<()> {
    if field.is_empty() {
        return Err(DocumentStoreError::invalid_query("field name must not be empty"));
    }
    if field.len() > MAX_FIELD_LEN {
        return Err(DocumentStoreError::invalid_query(format!(
            "field name exceeds {MAX_FIELD_LEN} characters"
        )));
    }
    if field.starts_with('$') || field.contains('.') || field.contains('\0') {
        return Err(DocumentStoreError::invalid_query(format!(
            "field name {field:?} is not allowed"
        )));
    }

    Ok(())
}

/// Converts a JSON value into its BSON counterpart.
///
/// Integers that fit in 32 bits become `Int32`, larger ones `Int64`, everything
/// else numeric becomes `Double`.
pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(value) => Bson::Boolean(*value),
        Value::Number(number) => number_to_bson(number),
        Value::String(value) => Bson::String(value.clone()),
        Value::Array(values) => Bson::Array(values.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(object_to_document(map)),
    }
}

fn number_to_bson(number: &Number) -> Bson {
    if let Some(value) = number.as_i64() {
        return match i32::try_from(value) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(value),
        };
    }
    if let Some(value) = number.as_u64() {
        return match i64::try_from(value) {
            Ok(large) => Bson::Int64(large),
            Err(_) => Bson::Double(value as f64),
        };
    }

    Bson::Double(number.as_f64().unwrap_or(f64::NAN))
}

fn object_to_document(map: &Map<String, Value>) -> Document {
    map.iter()
        .map(|(key, value)| (key.clone(), json_to_bson(value)))
        .collect()
}

/// Converts a request body into a BSON document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if the body is not a JSON object.
pub fn json_to_document(value: &Value) -> DocumentStoreResult<Document> {
    match value {
        Value::Object(map) => Ok(object_to_document(map)),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

/// Converts a stored BSON value into JSON for a response body.
///
/// UUID binaries render as hyphenated strings, datetimes as RFC 3339 strings and
/// object ids as hex. Types without a JSON counterpart fall back to their display form.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(value) => Value::Bool(*value),
        Bson::Int32(value) => Value::Number(Number::from(*value)),
        Bson::Int64(value) => Value::Number(Number::from(*value)),
        Bson::Double(value) => Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(value) => Value::String(value.clone()),
        Bson::Array(values) => Value::Array(values.iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(document_to_map(document)),
        Bson::DateTime(value) => Value::String(datetime_to_string(value)),
        Bson::ObjectId(value) => Value::String(object_id_to_string(value)),
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => {
            match <[u8; 16]>::try_from(binary.bytes.as_slice()) {
                Ok(bytes) => Value::String(Uuid::from_bytes(bytes).to_string()),
                Err(_) => Value::String(value.to_string()),
            }
        }
        other => Value::String(other.to_string()),
    }
}

fn document_to_map(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

/// Converts a stored document into a JSON object.
pub fn document_to_json(document: &Document) -> Value {
    Value::Object(document_to_map(document))
}

fn datetime_to_string(value: &DateTime) -> String {
    value
        .to_chrono()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn object_id_to_string(value: &ObjectId) -> String {
    value.to_hex()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
