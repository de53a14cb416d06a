//! Type coercion - untyped input to native parameter values
//!
//! Filters arrive as strings from the query string; insert/update payloads
//! and RPC arguments arrive as JSON. Both paths dispatch on the target
//! column's declared type and meet at the same `SqlValue` contract, so
//! parameter binding is uniform regardless of source.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use crate::catalog::{ArrayType, Column, DbType};
use crate::error::{ApiError, ApiResult};
use crate::sql::SqlValue;

/// Timestamp forms accepted from callers
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Convert a JSON value to the native form of `column`
pub fn coerce_json(column: &Column, value: &JsonValue) -> ApiResult<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match &column.ty {
        DbType::Boolean => match value {
            JsonValue::Bool(b) => Ok(SqlValue::Bool(*b)),
            JsonValue::String(s) => parse_bool(s).ok_or_else(|| coercion_error(column)),
            _ => Err(coercion_error(column)),
        },
        DbType::SmallInt => json_i64(value)
            .and_then(|n| i16::try_from(n).ok())
            .map(SqlValue::SmallInt)
            .ok_or_else(|| coercion_error(column)),
        DbType::Integer => json_i64(value)
            .and_then(|n| i32::try_from(n).ok())
            .map(SqlValue::Int)
            .ok_or_else(|| coercion_error(column)),
        DbType::BigInt => json_i64(value)
            .map(SqlValue::BigInt)
            .ok_or_else(|| coercion_error(column)),
        DbType::Real | DbType::Double | DbType::Numeric | DbType::Money => json_f64(value)
            .map(SqlValue::Float)
            .ok_or_else(|| coercion_error(column)),
        DbType::Text => value
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(|| coercion_error(column)),
        DbType::Date => value
            .as_str()
            .and_then(parse_date)
            .map(SqlValue::Date)
            .ok_or_else(|| coercion_error(column)),
        DbType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| coercion_error(column)),
        // Canonical re-serialization happens on bind; never a raw
        // pass-through of partially-typed input.
        DbType::Json | DbType::Jsonb => Ok(SqlValue::Json(value.clone())),
        DbType::Array(element) => coerce_array(column, element, value),
        DbType::Unknown => Ok(SqlValue::Text(json_to_text(value))),
    }
}

/// Convert a query-string value to the native form of `column`
pub fn coerce_str(column: &Column, value: &str) -> ApiResult<SqlValue> {
    match &column.ty {
        DbType::Boolean => parse_bool(value).ok_or_else(|| coercion_error(column)),
        DbType::SmallInt => value
            .parse::<i16>()
            .map(SqlValue::SmallInt)
            .map_err(|_| coercion_error(column)),
        DbType::Integer => value
            .parse::<i32>()
            .map(SqlValue::Int)
            .map_err(|_| coercion_error(column)),
        DbType::BigInt => value
            .parse::<i64>()
            .map(SqlValue::BigInt)
            .map_err(|_| coercion_error(column)),
        DbType::Real | DbType::Double | DbType::Numeric | DbType::Money => value
            .parse::<f64>()
            .map(SqlValue::Float)
            .map_err(|_| coercion_error(column)),
        DbType::Text | DbType::Unknown => Ok(SqlValue::Text(value.to_string())),
        DbType::Date => parse_date(value)
            .map(SqlValue::Date)
            .ok_or_else(|| coercion_error(column)),
        DbType::Timestamp => parse_timestamp(value)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| coercion_error(column)),
        // A raw string filtering a json column is a JSON string value.
        DbType::Json | DbType::Jsonb => Ok(SqlValue::Json(JsonValue::String(value.to_string()))),
        DbType::Array(element) => {
            let parsed: JsonValue =
                serde_json::from_str(value).map_err(|_| coercion_error(column))?;
            coerce_array(column, element, &parsed)
        }
    }
}

fn coerce_array(column: &Column, element: &ArrayType, value: &JsonValue) -> ApiResult<SqlValue> {
    match element {
        ArrayType::Int4 => serde_json::from_value(value.clone())
            .map(SqlValue::IntArray)
            .map_err(|_| coercion_error(column)),
        ArrayType::Int8 => serde_json::from_value(value.clone())
            .map(SqlValue::BigIntArray)
            .map_err(|_| coercion_error(column)),
        ArrayType::Text => serde_json::from_value(value.clone())
            .map(SqlValue::TextArray)
            .map_err(|_| coercion_error(column)),
        ArrayType::Unsupported(tag) => Err(ApiError::UnsupportedType {
            column: column.name.clone(),
            tag: tag.clone(),
        }),
    }
}

fn coercion_error(column: &Column) -> ApiError {
    ApiError::Coercion {
        field: column.api_name.clone(),
        ty: column.ty.clone(),
    }
}

fn parse_bool(value: &str) -> Option<SqlValue> {
    if value.eq_ignore_ascii_case("true") {
        Some(SqlValue::Bool(true))
    } else if value.eq_ignore_ascii_case("false") {
        Some(SqlValue::Bool(false))
    } else {
        None
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| parse_date(value).map(|d| d.and_hms_opt(0, 0, 0).unwrap()))
}

fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
