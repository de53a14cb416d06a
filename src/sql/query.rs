//! Query compiler - request intents to parameterized statements
//!
//! Resolves relation direction for every secondary table in the projection:
//! a foreign key on the primary table pointing at the secondary compiles to
//! a join plus nested object; a foreign key on the secondary pointing back
//! compiles to a correlated array subquery; anything else is omitted from
//! the result shape. Also carries the single-row, insert and update
//! compilers, which share the same coercion layer.

use convert_case::{Case, Casing};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::catalog::{Catalog, Table};
use crate::error::{ApiError, ApiResult};
use crate::request::SelectRequest;
use crate::sql::build::{Expr, Join, OrderKey, Pair, Predicate, SelectQuery};
use crate::sql::value::pg_param_type;
use crate::sql::{coerce, Statement};

/// Key column relations join against; single-column surrogate keys only
const KEY_COLUMN: &str = "id";

/// Compile a read request into one statement returning a single JSON array
/// scalar (NULL when no row matches; the caller substitutes `[]`)
pub fn compile_select(request: &SelectRequest, catalog: &Catalog) -> ApiResult<Statement> {
    let (primary_alias, primary) = request
        .tables
        .first()
        .ok_or_else(|| ApiError::Compile("request projects no tables".to_string()))?;

    // Relation and filter resolution run against the full catalog entry;
    // the request's own copy may project the key columns away.
    let full_primary = catalog
        .table(&primary.name)
        .ok_or_else(|| ApiError::TableNotFound(primary.name.clone()))?;

    let mut query = SelectQuery {
        from: full_primary.name.clone(),
        pairs: object_pairs(&full_primary.name, primary),
        joins: Vec::new(),
        predicates: Vec::new(),
        order: Vec::new(),
        offset: request.page.saturating_mul(request.size),
        limit: request.size,
    };

    for (alias, table) in request.tables.iter().skip(1) {
        let outgoing = full_primary.relation_to(&table.name).and_then(|c| {
            c.relation.as_ref().map(|r| (c.name.clone(), r.table.clone()))
        });
        if let Some((fk_column, referenced)) = outgoing {
            // Belongs-to: join on the primary table's foreign key, one
            // related row nested as an object.
            query.joins.push(Join {
                table: referenced,
                key: KEY_COLUMN.to_string(),
                fk_table: full_primary.name.clone(),
                fk_column,
            });
            query.pairs.push(Pair::new(
                alias.clone(),
                Expr::Object(object_pairs(&table.name, table)),
            ));
        } else if let Some(fk) = catalog
            .table(&table.name)
            .and_then(|t| t.relation_to(&full_primary.name))
        {
            // Has-many: the secondary table points back at the primary.
            query.pairs.push(Pair::new(
                alias.clone(),
                Expr::ArraySubquery {
                    table: table.name.clone(),
                    pairs: object_pairs(&table.name, table),
                    fk_column: fk.name.clone(),
                    parent_table: full_primary.name.clone(),
                    parent_key: KEY_COLUMN.to_string(),
                },
            ));
        } else {
            // No relation in either direction: omitted, not an error.
            debug!(primary = %primary_alias, skipped = %alias, "no relation path, dropping selection");
        }
    }

    for sort in &request.sorts {
        let Some(column) = full_primary.column_by_api_name(&sort.field) else {
            continue;
        };
        query.order.push(OrderKey {
            table: full_primary.name.clone(),
            column: column.name.clone(),
            dir: sort.dir,
        });
    }

    let mut statement = Statement::new(String::new());
    for filter in &request.filters {
        let Some(column) = full_primary.column_by_api_name(&filter.field) else {
            continue;
        };
        let value = coerce::coerce_str(column, &filter.value)?;
        let ordinal = statement.push_param(value, pg_param_type(&column.ty));
        query.predicates.push(Predicate {
            table: full_primary.name.clone(),
            column: column.name.clone(),
            op: filter.op,
            ordinal,
        });
    }

    statement.sql = query.render();
    Ok(statement)
}

/// Compile a single-row fetch by key: one JSON object scalar or no row
pub fn compile_single(table: &Table, id: &str) -> ApiResult<Statement> {
    let key = table
        .column_by_name(KEY_COLUMN)
        .or_else(|| table.columns.first())
        .ok_or_else(|| ApiError::Compile(format!("table '{}' has no columns", table.name)))?;

    let mut statement = Statement::new(String::new());
    let value = coerce::coerce_str(key, id)?;
    statement.push_param(value, pg_param_type(&key.ty));

    let mut sql = String::from("SELECT json_build_object(");
    super::build::render_pairs(&mut sql, &object_pairs(&table.name, table));
    sql.push_str(&format!(
        ") FROM {} WHERE {}.{} = $1",
        table.name, table.name, key.name
    ));

    statement.sql = sql;
    Ok(statement)
}

/// Compile an insert from a JSON payload
///
/// Payload keys are externally-facing names; unknown keys are skipped.
pub fn compile_insert(table: &Table, data: &JsonMap<String, JsonValue>) -> ApiResult<Statement> {
    let mut statement = Statement::new(String::new());
    let mut columns: Vec<&str> = Vec::new();

    for (key, value) in data {
        let Some(column) = table.column_by_name(&key.to_case(Case::Snake)) else {
            continue;
        };
        let native = coerce::coerce_json(column, value)?;
        statement.push_param(native, pg_param_type(&column.ty));
        columns.push(&column.name);
    }

    if columns.is_empty() {
        return Err(ApiError::Compile(format!(
            "no column of '{}' matches the payload",
            table.name
        )));
    }

    let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("${n}")).collect();
    statement.sql = format!(
        "INSERT INTO {} ({}) VALUES({})",
        table.name,
        columns.join(","),
        placeholders.join(",")
    );
    Ok(statement)
}

/// Compile an update-by-key from a JSON payload
pub fn compile_update(
    table: &Table,
    id: &str,
    data: &JsonMap<String, JsonValue>,
) -> ApiResult<Statement> {
    let mut statement = Statement::new(String::new());
    let mut assignments: Vec<String> = Vec::new();

    for (key, value) in data {
        let Some(column) = table.column_by_name(&key.to_case(Case::Snake)) else {
            continue;
        };
        let native = coerce::coerce_json(column, value)?;
        let ordinal = statement.push_param(native, pg_param_type(&column.ty));
        assignments.push(format!("{} = ${}", column.name, ordinal));
    }

    if assignments.is_empty() {
        return Err(ApiError::Compile(format!(
            "no column of '{}' matches the payload",
            table.name
        )));
    }

    let key = table
        .column_by_name(KEY_COLUMN)
        .or_else(|| table.columns.first())
        .ok_or_else(|| ApiError::Compile(format!("table '{}' has no columns", table.name)))?;
    let ordinal = statement.push_param(coerce::coerce_str(key, id)?, pg_param_type(&key.ty));

    statement.sql = format!(
        "UPDATE {} SET {} WHERE {}.{} = ${}",
        table.name,
        assignments.join(","),
        table.name,
        key.name,
        ordinal
    );
    Ok(statement)
}

/// Projection pairs for one table: external key, qualified column reference
fn object_pairs(qualifier: &str, table: &Table) -> Vec<Pair> {
    table
        .columns
        .iter()
        .map(|c| {
            Pair::new(
                c.api_name.clone(),
                Expr::Column {
                    table: qualifier.to_string(),
                    column: c.name.clone(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DbType};
    use crate::sql::SqlValue;
    use serde_json::json;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", 1, DbType::Integer).nullable(false))
            .column(Column::new("full_name", 2, DbType::Text))
            .column(Column::new("email", 3, DbType::Text))
    }

    #[test]
    fn test_compile_single() {
        let stmt = compile_single(&users(), "7").unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT json_build_object('id',users.id,'fullName',users.full_name,\
             'email',users.email) FROM users WHERE users.id = $1"
        );
        assert_eq!(stmt.params, vec![SqlValue::Int(7)]);
    }

    #[test]
    fn test_compile_single_bad_key_value() {
        let err = compile_single(&users(), "seven").unwrap_err();
        assert!(matches!(err, ApiError::Coercion { .. }));
    }

    #[test]
    fn test_compile_insert_skips_unknown_keys() {
        let payload = json!({"fullName": "Ada", "email": "ada@example.com", "bogus": 1});
        let stmt = compile_insert(&users(), payload.as_object().unwrap()).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (full_name,email) VALUES($1,$2)"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Text("Ada".to_string()),
                SqlValue::Text("ada@example.com".to_string())
            ]
        );
    }

    #[test]
    fn test_compile_insert_nothing_recognized() {
        let payload = json!({"bogus": 1});
        let err = compile_insert(&users(), payload.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ApiError::Compile(_)));
    }

    #[test]
    fn test_compile_update() {
        let payload = json!({"email": "new@example.com"});
        let stmt = compile_update(&users(), "3", payload.as_object().unwrap()).unwrap();
        assert_eq!(stmt.sql, "UPDATE users SET email = $1 WHERE users.id = $2");
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Text("new@example.com".to_string()),
                SqlValue::Int(3)
            ]
        );
    }
}
