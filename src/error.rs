//! API error types
//!
//! One taxonomy for the whole query core. Engine failures are classified by
//! their SQLSTATE so the transport layer can pick a response status without
//! inspecting Postgres internals itself.

use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::catalog::DbType;

/// Result type for query-core operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors produced while compiling or executing a data-API request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Requested table is not present in the catalog
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Requested stored function is not present in the catalog
    #[error("function '{0}' not found")]
    FunctionNotFound(String),

    /// Request could not be compiled into SQL
    #[error("cannot compile request: {0}")]
    Compile(String),

    /// Value cannot be converted to the declared column type
    #[error("value for '{field}' is not a valid {ty:?}")]
    Coercion { field: String, ty: DbType },

    /// Declared column type the coercion layer has no mapping for
    ///
    /// A configuration failure, not a per-value one: the schema declares
    /// something this core was never taught to bind.
    #[error("column '{column}' has unsupported type '{tag}'")]
    UnsupportedType { column: String, tag: String },

    /// RPC call lacking a required parameter
    #[error("missing required parameter: {0}")]
    MissingArgument(String),

    /// Introspection produced metadata this core cannot parse
    #[error("malformed catalog metadata: {0}")]
    Metadata(String),

    /// Error from the engine or the connection to it
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
}

/// Coarse classification consumed by the transport layer
///
/// `AccessDenied` maps to 401 or 403 depending on whether the caller was
/// authenticated, which only the transport knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    AccessDenied,
    Internal,
}

impl ApiError {
    /// Classify this error for response mapping
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::TableNotFound(_) | ApiError::FunctionNotFound(_) => ErrorKind::NotFound,
            ApiError::Compile(_)
            | ApiError::Coercion { .. }
            | ApiError::MissingArgument(_) => ErrorKind::BadRequest,
            ApiError::UnsupportedType { .. } | ApiError::Metadata(_) => ErrorKind::Internal,
            ApiError::Db(e) => classify_db_error(e),
        }
    }

    /// The engine's own message when one exists, otherwise the display form
    pub fn engine_message(&self) -> String {
        match self {
            ApiError::Db(e) => match e.as_db_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Map an engine SQLSTATE onto a response class
///
/// 42501 is a row-level-security / privilege rejection under the propagated
/// role. P0001 (RAISE) and class 22 are bad input. 28P01 and 42883 surface
/// from the login and RPC paths with messages worth passing through.
fn classify_db_error(err: &tokio_postgres::Error) -> ErrorKind {
    let Some(db) = err.as_db_error() else {
        return ErrorKind::Internal;
    };

    let code = db.code();
    if *code == SqlState::INSUFFICIENT_PRIVILEGE {
        ErrorKind::AccessDenied
    } else if *code == SqlState::RAISE_EXCEPTION
        || *code == SqlState::INVALID_PASSWORD
        || *code == SqlState::UNDEFINED_FUNCTION
        || code.code().starts_with("22")
    {
        ErrorKind::BadRequest
    } else {
        ErrorKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_not_found() {
        assert_eq!(
            ApiError::TableNotFound("users".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ApiError::FunctionNotFound("login".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_kind_bad_request() {
        assert_eq!(
            ApiError::Compile("nested too deep".into()).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            ApiError::MissingArgument("email".into()).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            ApiError::Coercion {
                field: "age".into(),
                ty: DbType::Integer,
            }
            .kind(),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn test_kind_unsupported_type_is_internal() {
        let err = ApiError::UnsupportedType {
            column: "tags".into(),
            tag: "_uuid".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = ApiError::MissingArgument("password".into());
        assert_eq!(err.to_string(), "missing required parameter: password");

        let err = ApiError::Coercion {
            field: "createdAt".into(),
            ty: DbType::Timestamp,
        };
        assert!(err.to_string().contains("createdAt"));
    }
}
