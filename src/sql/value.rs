//! SqlValue - owned parameter values for compiled statements
//!
//! A closed enum covering every native form the coercion layer can produce.
//! Binding delegates to the wrapped type's own wire encoding; the statement
//! is prepared with types derived from the target columns, so the enum
//! itself accepts any declared type.

use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::catalog::{ArrayType, DbType};

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit integer
    SmallInt(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    BigInt(i64),
    /// Floating point (also carries numeric and money input)
    Float(f64),
    /// Text kinds
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time, no zone
    Timestamp(NaiveDateTime),
    /// json / jsonb document, re-serialized canonically on bind
    Json(JsonValue),
    /// integer[]
    IntArray(Vec<i32>),
    /// bigint[]
    BigIntArray(Vec<i64>),
    /// text[]
    TextArray(Vec<String>),
}

impl SqlValue {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::SmallInt(v) => v.to_sql(ty, out),
            SqlValue::Int(v) => v.to_sql(ty, out),
            SqlValue::BigInt(v) => v.to_sql(ty, out),
            SqlValue::Float(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
            SqlValue::IntArray(v) => v.to_sql(ty, out),
            SqlValue::BigIntArray(v) => v.to_sql(ty, out),
            SqlValue::TextArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The prepared type always comes from the column declaration.
        true
    }

    to_sql_checked!();
}

/// Wire type a parameter targeting `ty` is prepared with
///
/// Numeric and money bind as float8; the engine's own casts cover the
/// comparison. Unknown declared types transfer as text.
pub fn pg_param_type(ty: &DbType) -> Type {
    match ty {
        DbType::Boolean => Type::BOOL,
        DbType::SmallInt => Type::INT2,
        DbType::Integer => Type::INT4,
        DbType::BigInt => Type::INT8,
        DbType::Real | DbType::Double | DbType::Numeric | DbType::Money => Type::FLOAT8,
        DbType::Text | DbType::Unknown => Type::TEXT,
        DbType::Date => Type::DATE,
        DbType::Timestamp => Type::TIMESTAMP,
        DbType::Json => Type::JSON,
        DbType::Jsonb => Type::JSONB,
        DbType::Array(ArrayType::Int4) => Type::INT4_ARRAY,
        DbType::Array(ArrayType::Int8) => Type::INT8_ARRAY,
        DbType::Array(ArrayType::Text) => Type::TEXT_ARRAY,
        // Coercion rejects these before anything binds.
        DbType::Array(ArrayType::Unsupported(_)) => Type::TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_types_follow_declaration() {
        assert_eq!(pg_param_type(&DbType::Integer), Type::INT4);
        assert_eq!(pg_param_type(&DbType::BigInt), Type::INT8);
        assert_eq!(pg_param_type(&DbType::Numeric), Type::FLOAT8);
        assert_eq!(pg_param_type(&DbType::Jsonb), Type::JSONB);
        assert_eq!(pg_param_type(&DbType::Unknown), Type::TEXT);
        assert_eq!(
            pg_param_type(&DbType::Array(ArrayType::Text)),
            Type::TEXT_ARRAY
        );
    }

    #[test]
    fn test_null_binds_as_null() {
        let mut buf = BytesMut::new();
        let res = SqlValue::Null.to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(res, IsNull::Yes));
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Bool(true).is_null());
    }

    #[test]
    fn test_value_delegation_encodes() {
        let mut buf = BytesMut::new();
        let res = SqlValue::Int(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(res, IsNull::No));
        assert_eq!(&buf[..], &7i32.to_be_bytes());
    }
}
