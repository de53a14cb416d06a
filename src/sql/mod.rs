//! SQL layer - parameter values, coercion, and statement compilation
//!
//! This module provides:
//! - `SqlValue`: owned parameter values bound to compiled statements
//! - `coerce`: column-type-driven conversion of JSON and string input
//! - `build`: the tree-structured SQL intermediate representation
//! - `query`: the read/write statement compilers
//! - `rpc`: the stored-function call compiler

pub mod build;
pub mod coerce;
pub mod query;
pub mod rpc;
pub mod value;

use tokio_postgres::types::Type;

pub use value::SqlValue;

/// A compiled, parameterized statement
///
/// `params[i]` binds placeholder `$(i+1)`; `types[i]` is the wire type the
/// statement is prepared with, derived from the target column so untyped
/// JSON input always binds against the schema's declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Rendered SQL text
    pub sql: String,
    /// Parameter values in placeholder order
    pub params: Vec<SqlValue>,
    /// Declared parameter types in placeholder order
    pub types: Vec<Type>,
}

impl Statement {
    /// Create a statement with no parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Append a parameter, returning its 1-based placeholder ordinal
    pub fn push_param(&mut self, value: SqlValue, ty: Type) -> usize {
        self.params.push(value);
        self.types.push(ty);
        self.params.len()
    }
}
