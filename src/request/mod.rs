//! Request intent - structured form of a data-API query string
//!
//! A raw query string is parsed into a `SelectRequest`: which tables and
//! columns to project (the first entry anchors everything), filters, sort
//! order and pagination. Filters and sorts naming unknown columns are
//! dropped, never errors, so old clients keep working against evolving
//! schemas.

pub mod select;

use crate::catalog::{Catalog, Table};
use crate::error::{ApiError, ApiResult};

/// Query-string keys that are never filters
const RESERVED_KEYS: [&str; 4] = ["page", "size", "sort", "select"];

/// Default page size when the caller sends none
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl FilterOp {
    /// Parse an operator suffix; anything unrecognized is equality
    pub fn from_suffix(suffix: &str) -> FilterOp {
        match suffix {
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            _ => FilterOp::Eq,
        }
    }

    /// SQL spelling
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "LIKE",
        }
    }
}

/// A single `field.op=value` filter on the primary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Externally-facing field name
    pub field: String,
    pub op: FilterOp,
    /// Raw value as it arrived in the query string
    pub value: String,
}

impl Filter {
    /// Parse a non-reserved query pair into a filter
    ///
    /// The key must split on `.` into exactly a field and an operator
    /// suffix; anything else is dropped.
    pub fn parse(key: &str, value: &str) -> Option<Filter> {
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        if parts.len() != 2 {
            return None;
        }

        Some(Filter {
            field: parts[0].to_string(),
            op: FilterOp::from_suffix(parts[1]),
            value: value.to_string(),
        })
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// SQL spelling
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// A single sort key on the primary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Externally-facing field name
    pub field: String,
    pub dir: SortDir,
}

impl Sort {
    /// Parse a `sort` value: `field`, `field.true` / `ASC` ascending,
    /// any other suffix descending
    pub fn parse(input: &str) -> Option<Sort> {
        let parts: Vec<&str> = input.split('.').filter(|p| !p.is_empty()).collect();
        let field = parts.first()?.to_string();
        if parts.len() < 2 {
            return Some(Sort {
                field,
                dir: SortDir::Asc,
            });
        }

        let dir = if parts[1].eq_ignore_ascii_case("true") || parts[1].eq_ignore_ascii_case("asc") {
            SortDir::Asc
        } else {
            SortDir::Desc
        };
        Some(Sort { field, dir })
    }
}

/// Structured, validated form of one data-API request
///
/// The first entry of `tables` is the primary table; it anchors joins,
/// filters, sort and pagination. Further entries are relation projections
/// keyed by alias. Built fresh per request from immutable catalog values.
#[derive(Debug, Clone)]
pub struct SelectRequest {
    /// Page number, zero-based
    pub page: i64,
    /// Rows per page
    pub size: i64,
    /// Alias -> projected table, in projection order
    pub tables: Vec<(String, Table)>,
    /// Filters on the primary table
    pub filters: Vec<Filter>,
    /// Sort keys on the primary table
    pub sorts: Vec<Sort>,
}

impl SelectRequest {
    /// Build a request intent for `table_name` from decoded query pairs
    ///
    /// `pairs` holds every query-string entry in arrival order; repeated
    /// keys (`sort`) repeat in the slice.
    pub fn from_query(
        table_name: &str,
        pairs: &[(String, String)],
        catalog: &Catalog,
    ) -> ApiResult<SelectRequest> {
        let table = catalog
            .table(table_name)
            .ok_or_else(|| ApiError::TableNotFound(table_name.to_string()))?;

        let page = first_value(pairs, "page")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|p| p.max(0))
            .unwrap_or(0);
        let size = first_value(pairs, "size")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|s| s.max(1))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let sorts = pairs
            .iter()
            .filter(|(k, _)| k == "sort")
            .filter_map(|(_, v)| Sort::parse(v))
            .collect();

        let mut tables: Vec<(String, Table)> = Vec::new();
        if let Some(expr) = first_value(pairs, "select") {
            let list = select::parse_select(expr)?;

            let fields: Vec<&str> = list.primary.iter().map(|s| s.as_str()).collect();
            tables.push((table.name.clone(), table.project(&fields)));

            for entry in &list.entries {
                // Unknown relation tables are skipped, not errors.
                let Some(related) = catalog.table(&entry.table) else {
                    continue;
                };
                let fields: Vec<&str> = entry.columns.iter().map(|s| s.as_str()).collect();
                tables.push((entry.alias.clone(), related.project(&fields)));
            }
        } else {
            tables.push((table.name.clone(), table.clone()));
        }

        let filters = pairs
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .filter_map(|(k, v)| Filter::parse(k, v))
            .collect();

        Ok(SelectRequest {
            page,
            size,
            tables,
            filters,
            sorts,
        })
    }

    /// The primary table anchoring this request
    pub fn primary(&self) -> &Table {
        &self.tables[0].1
    }
}

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
