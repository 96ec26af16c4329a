use std::fmt::Write;

use serde_json::{json, Value as JsonValue};
use yachtsql::{DataType, Value as YachtValue};

pub fn datatype_to_bq_type(dt: &DataType) -> String {
    let name = match dt {
        DataType::Bool => "BOOLEAN",
        DataType::Int64 => "INT64",
        DataType::Float64 => "FLOAT64",
        DataType::Numeric(_) | DataType::BigNumeric => "NUMERIC",
        DataType::Bytes => "BYTES",
        DataType::Date => "DATE",
        DataType::DateTime => "DATETIME",
        DataType::Time => "TIME",
        DataType::Timestamp => "TIMESTAMP",
        DataType::Geography => "GEOGRAPHY",
        DataType::Json => "JSON",
        DataType::Struct(_) => "STRUCT",
        DataType::Interval => "INTERVAL",
        DataType::Array(inner) => return format!("ARRAY<{}>", datatype_to_bq_type(inner)),
        DataType::String | DataType::Range(_) | DataType::Unknown => "STRING",
    };
    name.to_string()
}

/// Converts an engine value into the JSON shape rows are returned in. Dates
/// and times render as their canonical text, bytes as lowercase hex.
pub fn yacht_value_into_json(value: YachtValue) -> JsonValue {
    match value {
        YachtValue::Null | YachtValue::Default => JsonValue::Null,
        YachtValue::Bool(b) => JsonValue::Bool(b),
        YachtValue::Int64(i) => json!(i),
        YachtValue::Float64(f) => json!(f.into_inner()),
        YachtValue::Numeric(d) => JsonValue::String(d.to_string()),
        YachtValue::BigNumeric(n) => JsonValue::String(n.to_string()),
        YachtValue::String(s) | YachtValue::Geography(s) => JsonValue::String(s),
        YachtValue::Bytes(b) => JsonValue::String(hex_string(&b)),
        YachtValue::Date(d) => JsonValue::String(d.to_string()),
        YachtValue::Time(t) => JsonValue::String(t.to_string()),
        YachtValue::DateTime(dt) => JsonValue::String(dt.to_string()),
        YachtValue::Timestamp(ts) => JsonValue::String(ts.to_string()),
        YachtValue::Json(j) => j,
        YachtValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(yacht_value_into_json).collect())
        }
        YachtValue::Struct(fields) => JsonValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, yacht_value_into_json(v)))
                .collect(),
        ),
        YachtValue::Interval(i) => JsonValue::String(format!("{:?}", i)),
        YachtValue::Range(r) => JsonValue::String(format!("{:?}", r)),
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
