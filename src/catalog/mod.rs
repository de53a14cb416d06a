//! Catalog - schema metadata (tables, columns, relations, functions)
//!
//! The catalog is introspected from the engine's system catalogs on first
//! use and cached for the process. Tables, columns and relations are
//! immutable value types; per-request customization (column projection)
//! produces new values instead of mutating the cache.

pub mod introspect;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use convert_case::{Case, Casing};
use parking_lot::RwLock;
use tokio_postgres::Client;

use crate::error::ApiResult;

/// Column type categories the coercion and SQL-generation logic understands
///
/// A closed set: adding a type is a compile-time-checked extension point for
/// every exhaustive match downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbType {
    /// Boolean (true/false)
    Boolean,
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    BigInt,
    /// 32-bit floating point
    Real,
    /// 64-bit floating point
    Double,
    /// Arbitrary-precision decimal
    Numeric,
    /// Currency amount
    Money,
    /// Text kinds (text, char, varchar, name, citext)
    Text,
    /// Calendar date
    Date,
    /// Date and time (with or without zone)
    Timestamp,
    /// json column
    Json,
    /// jsonb column
    Jsonb,
    /// Array of a tagged element type
    Array(ArrayType),
    /// Declared type with no mapping; values pass through best-effort
    Unknown,
}

/// Element type tag for array columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayType {
    /// integer[]
    Int4,
    /// bigint[]
    Int8,
    /// text[]
    Text,
    /// Element type the binding layer has no mapping for; carries the
    /// declared tag for the configuration error it raises
    Unsupported(String),
}

impl DbType {
    /// Check if this type is an integer kind
    pub fn is_integer(&self) -> bool {
        matches!(self, DbType::SmallInt | DbType::Integer | DbType::BigInt)
    }

    /// Check if this type is a floating/decimal kind
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DbType::Real | DbType::Double | DbType::Numeric | DbType::Money
        )
    }

    /// Check if this type is textual
    pub fn is_text(&self) -> bool {
        matches!(self, DbType::Text)
    }

    /// Map a formatted type name (`format_type` output) onto the closed set
    ///
    /// Arrays arrive as `element[]`. Anything unrecognized maps to
    /// `Unknown`; the load path logs it.
    pub fn parse(declared: &str) -> DbType {
        let declared = declared.trim().to_ascii_lowercase();

        if let Some(element) = declared.strip_suffix("[]") {
            return DbType::Array(match element {
                "integer" | "int4" => ArrayType::Int4,
                "bigint" | "int8" => ArrayType::Int8,
                "text" => ArrayType::Text,
                other => ArrayType::Unsupported(other.to_string()),
            });
        }

        match declared.as_str() {
            "boolean" | "bool" => DbType::Boolean,
            "smallint" | "int2" => DbType::SmallInt,
            "integer" | "int4" => DbType::Integer,
            "bigint" | "int8" => DbType::BigInt,
            "real" | "float4" => DbType::Real,
            "double precision" | "float8" => DbType::Double,
            "numeric" => DbType::Numeric,
            "money" => DbType::Money,
            "text" | "name" | "citext" => DbType::Text,
            "date" => DbType::Date,
            "json" => DbType::Json,
            "jsonb" => DbType::Jsonb,
            s if s.starts_with("character") || s.starts_with("char") => DbType::Text,
            s if s.starts_with("timestamp") => DbType::Timestamp,
            _ => DbType::Unknown,
        }
    }
}

/// Foreign-key relation attached to a column
///
/// Always points at exactly one other table; composite keys are not modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Constraint name in the engine
    pub constraint: String,
    /// Referenced table name
    pub table: String,
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name as declared (snake_case)
    pub name: String,
    /// Externally-facing camel-cased name
    pub api_name: String,
    /// 1-based ordinal position
    pub position: i32,
    /// Whether NULL values are allowed
    pub nullable: bool,
    /// Declared type mapped onto the closed set
    pub ty: DbType,
    /// Outgoing foreign-key relation, if this column is one
    pub relation: Option<Relation>,
}

impl Column {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, position: i32, ty: DbType) -> Self {
        let name = name.into();
        let api_name = name.to_case(Case::Camel);
        Self {
            name,
            api_name,
            position,
            nullable: true,
            ty,
            relation: None,
        }
    }

    /// Set nullable
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Attach a foreign-key relation
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.relation = Some(Relation {
            constraint: constraint.into(),
            table: table.into(),
        });
        self
    }
}

/// Table definition
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name as declared (snake_case)
    pub name: String,
    /// Externally-facing camel-cased name
    pub api_name: String,
    /// Schema the table lives in
    pub schema: String,
    /// Columns ordered by position
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a new table definition in the default schema
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let api_name = name.to_case(Case::Camel);
        Self {
            name,
            api_name,
            schema: "public".to_string(),
            columns: Vec::new(),
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, col: Column) -> Self {
        self.columns.push(col);
        self
    }

    /// Get a column by declared name
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Get a column by its externally-facing name
    pub fn column_by_api_name(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.api_name.eq_ignore_ascii_case(name))
    }

    /// Find the column carrying an outgoing relation to `other`
    pub fn relation_to(&self, other: &str) -> Option<&Column> {
        self.columns.iter().find(|c| {
            c.relation
                .as_ref()
                .is_some_and(|r| r.table.eq_ignore_ascii_case(other))
        })
    }

    /// Project onto the requested externally-facing column names
    ///
    /// Unknown names are dropped; when nothing survives, the full column
    /// list is kept so a bad select still returns rows. Returns a new value,
    /// never touches the cached definition.
    #[must_use]
    pub fn project(&self, fields: &[&str]) -> Table {
        let columns: Vec<Column> = fields
            .iter()
            .filter_map(|f| self.column_by_api_name(f.trim()).cloned())
            .collect();

        Table {
            name: self.name.clone(),
            api_name: self.api_name.clone(),
            schema: self.schema.clone(),
            columns: if columns.is_empty() {
                self.columns.clone()
            } else {
                columns
            },
        }
    }
}

/// Stored-function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParam {
    /// Parameter name
    pub name: String,
    /// Declared type name
    pub ty: String,
}

/// Stored-function definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Schema the function lives in
    pub schema: String,
    /// Parameters in declared order
    pub params: Vec<FunctionParam>,
    /// Declared return type; `void` means invoked for effect only
    pub return_type: String,
}

impl Function {
    /// Create a new function definition
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: "public".to_string(),
            params: Vec::new(),
            return_type: return_type.into(),
        }
    }

    /// Append a parameter (declared order)
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.params.push(FunctionParam {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    /// Whether the function returns nothing
    pub fn is_void(&self) -> bool {
        self.return_type.eq_ignore_ascii_case("void")
    }
}

/// Database catalog - immutable table and function metadata
#[derive(Debug, Default)]
pub struct Catalog {
    /// Tables keyed by lower-cased name, iterated in name order
    tables: BTreeMap<String, Table>,
    /// Functions keyed by lower-cased name
    functions: HashMap<String, Function>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table (used when rebuilding from introspection and by tests)
    pub fn register_table(&mut self, table: Table) {
        self.tables.insert(table.name.to_ascii_lowercase(), table);
    }

    /// Register a function
    pub fn register_function(&mut self, function: Function) {
        self.functions
            .insert(function.name.to_ascii_lowercase(), function);
    }

    /// Get a table by name (case-insensitive)
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// List all tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Get a function by name (case-insensitive)
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(&name.to_ascii_lowercase())
    }

    /// List all functions
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    /// Number of registered tables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Process-wide read-mostly catalog cache
///
/// Populated at most once under a load-if-empty policy. Concurrent first
/// requests may introspect redundantly; the computation is idempotent per
/// schema, so last write wins. A failed load is never cached - the next
/// call retries.
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: RwLock<Option<Arc<Catalog>>>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached catalog, introspecting the engine on first call
    pub async fn load(&self, client: &Client) -> ApiResult<Arc<Catalog>> {
        if let Some(catalog) = self.inner.read().clone() {
            return Ok(catalog);
        }

        // Introspection runs outside the lock; racing loaders compute the
        // same result.
        let catalog = Arc::new(introspect::load_catalog(client).await?);
        *self.inner.write() = Some(catalog.clone());
        Ok(catalog)
    }

    /// Snapshot without loading; `None` until the first successful load
    pub fn get(&self) -> Option<Arc<Catalog>> {
        self.inner.read().clone()
    }

    /// Drop the cached catalog so the next load re-introspects
    pub fn invalidate(&self) {
        *self.inner.write() = None;
    }
}
