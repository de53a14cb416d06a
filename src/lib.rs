//! Datagate - a generic Postgres data-API query core
//!
//! Compiles query-string selections, filters, sorts and pagination into a
//! single parameterized SQL statement that returns JSON straight from the
//! engine:
//! - Schema catalog introspection and process-wide caching
//! - Select/filter/sort mini-language parsing
//! - Join and correlated-subquery resolution over foreign-key relations
//! - JSON/string to SQL parameter coercion keyed on column types
//! - Stored-function (RPC) call compilation
//! - Per-request security-context propagation for row-level enforcement

pub mod catalog;
pub mod error;
pub mod request;
pub mod service;
pub mod session;
pub mod sql;

pub use error::{ApiError, ApiResult, ErrorKind};
