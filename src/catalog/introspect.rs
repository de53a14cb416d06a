//! Catalog introspection
//!
//! Issues metadata queries against the engine's system catalogs and parses
//! the JSON they aggregate into the in-memory catalog graph. Runs once per
//! process under the cache's load-if-empty policy.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio_postgres::Client;
use tracing::{debug, warn};

use super::{ArrayType, Catalog, Column, DbType, Function, FunctionParam, Relation, Table};
use crate::error::ApiResult;

/// Tables, columns and foreign-key relations for every relation and view in
/// the default schema, aggregated into one JSON document.
const TABLES_QUERY: &str = "\
SELECT json_agg(tables) FROM (SELECT c.relname AS name, n.nspname AS schema,
json_agg(json_build_object('name', a.attname, 'type', format_type(a.atttypid, NULL),
    'nullable', a.attnotnull = false, 'position', a.attnum,
    'relation', (SELECT json_build_object('constraint', con.conname,
        'table', (SELECT rel.relname FROM pg_class AS rel WHERE rel.oid = con.confrelid))
        FROM pg_constraint AS con
        WHERE con.conrelid = c.oid AND con.contype = 'f' AND ARRAY[a.attnum] <@ con.conkey))
) AS columns
FROM pg_class AS c
JOIN pg_namespace AS n ON n.oid = c.relnamespace
JOIN pg_attribute AS a ON a.attrelid = c.oid AND a.attnum > 0
WHERE (c.relkind = 'r' OR c.relkind = 'v') AND n.nspname = 'public'
GROUP BY c.relname, n.nspname) AS tables";

/// Stored functions exposed through the registry view, one JSON document per
/// row. `args` is an object whose key order is the declared parameter order.
const FUNCTIONS_QUERY: &str = "\
SELECT json_build_object('schema', schema, 'name', name, 'type', return_type,
    'parameters', args)
FROM app_functions";

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    schema: String,
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    nullable: bool,
    position: i32,
    relation: Option<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    #[serde(rename = "constraint")]
    constraint_name: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    schema: String,
    #[serde(rename = "type")]
    return_type: String,
    parameters: Option<serde_json::Map<String, JsonValue>>,
}

/// Introspect the engine and build the full catalog
///
/// A failure here propagates uncached so the next request retries.
pub async fn load_catalog(client: &Client) -> ApiResult<Catalog> {
    let mut catalog = Catalog::new();

    for table in load_tables(client).await? {
        catalog.register_table(table);
    }
    for function in load_functions(client).await? {
        catalog.register_function(function);
    }

    debug!(tables = catalog.table_count(), "catalog loaded");
    Ok(catalog)
}

async fn load_tables(client: &Client) -> ApiResult<Vec<Table>> {
    let row = client.query_one(TABLES_QUERY, &[]).await?;
    let doc: Option<JsonValue> = row.try_get(0)?;

    // An empty schema aggregates to NULL.
    let Some(doc) = doc else {
        warn!("schema introspection returned no tables");
        return Ok(Vec::new());
    };

    let raw: Vec<RawTable> =
        serde_json::from_value(doc).map_err(|e| crate::error::ApiError::Metadata(e.to_string()))?;

    Ok(raw.into_iter().map(build_table).collect())
}

fn build_table(raw: RawTable) -> Table {
    let mut table = Table::new(raw.name);
    table.schema = raw.schema;

    let mut columns = raw.columns;
    columns.sort_by_key(|c| c.position);

    for raw_col in columns {
        let ty = DbType::parse(&raw_col.ty);
        match &ty {
            DbType::Unknown => {
                warn!(table = %table.name, column = %raw_col.name, declared = %raw_col.ty,
                    "unsupported column type, values will pass through unmodified");
            }
            DbType::Array(ArrayType::Unsupported(tag)) => {
                warn!(table = %table.name, column = %raw_col.name, %tag,
                    "unsupported array element type, binding values will fail");
            }
            _ => {}
        }

        let mut column = Column::new(raw_col.name, raw_col.position, ty);
        column.nullable = raw_col.nullable;
        column.relation = raw_col.relation.map(|r| Relation {
            constraint: r.constraint_name,
            table: r.table,
        });
        table.columns.push(column);
    }

    table
}

async fn load_functions(client: &Client) -> ApiResult<Vec<Function>> {
    let rows = client.query(FUNCTIONS_QUERY, &[]).await?;

    let mut functions = Vec::with_capacity(rows.len());
    for row in rows {
        let doc: JsonValue = row.try_get(0)?;
        let raw: RawFunction = serde_json::from_value(doc)
            .map_err(|e| crate::error::ApiError::Metadata(e.to_string()))?;

        let mut function = Function::new(raw.name, raw.return_type);
        function.schema = raw.schema;
        if let Some(params) = raw.parameters {
            for (name, ty) in params {
                function.params.push(FunctionParam {
                    name,
                    ty: ty.as_str().unwrap_or_default().to_string(),
                });
            }
        }
        functions.push(function);
    }

    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_table_orders_and_links_columns() {
        let raw: RawTable = serde_json::from_value(json!({
            "name": "posts",
            "schema": "public",
            "columns": [
                {"name": "title", "type": "text", "nullable": true, "position": 2, "relation": null},
                {"name": "id", "type": "integer", "nullable": false, "position": 1, "relation": null},
                {"name": "user_id", "type": "integer", "nullable": false, "position": 3,
                 "relation": {"constraint": "posts_user_id_fkey", "table": "users"}}
            ]
        }))
        .unwrap();

        let table = build_table(raw);
        assert_eq!(table.columns[0].name, "id");
        assert_eq!(table.columns[1].name, "title");
        assert_eq!(table.columns[2].relation.as_ref().unwrap().table, "users");
        assert_eq!(
            table.columns[2].relation.as_ref().unwrap().constraint,
            "posts_user_id_fkey"
        );
        assert!(!table.columns[0].nullable);
    }

    #[test]
    fn test_function_metadata_preserves_parameter_order() {
        let raw: RawFunction = serde_json::from_value(json!({
            "schema": "public",
            "name": "login",
            "type": "text",
            "parameters": {"email": "text", "password": "text", "remember": "boolean"}
        }))
        .unwrap();

        let names: Vec<&str> = raw
            .parameters
            .as_ref()
            .unwrap()
            .keys()
            .map(|k| k.as_str())
            .collect();
        assert_eq!(names, vec!["email", "password", "remember"]);
    }
}
