//! Data service - per-request orchestration
//!
//! One instance per request, borrowing the connection an external
//! collaborator acquired and released. Every operation loads the shared
//! catalog, propagates the caller's security context onto the session, then
//! executes a compiled statement. Cancellation propagates through each
//! await; nothing is retried.

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};
use tracing::debug;

use crate::catalog::SchemaCache;
use crate::error::{ApiError, ApiResult};
use crate::request::SelectRequest;
use crate::session::{prepare_session, CallerIdentity};
use crate::sql::{query, rpc, Statement};

/// Per-request gateway over one open connection
pub struct DataService<'a> {
    client: &'a Client,
    cache: &'a SchemaCache,
    identity: CallerIdentity,
}

impl<'a> DataService<'a> {
    /// Create a service for one request
    pub fn new(client: &'a Client, cache: &'a SchemaCache, identity: CallerIdentity) -> Self {
        Self {
            client,
            cache,
            identity,
        }
    }

    /// Run a read request; the response body comes verbatim from the engine
    ///
    /// A request matching zero rows returns `[]`, never null.
    pub async fn get(&self, table: &str, pairs: &[(String, String)]) -> ApiResult<String> {
        let catalog = self.cache.load(self.client).await?;
        let request = SelectRequest::from_query(table, pairs, &catalog)?;
        let statement = query::compile_select(&request, &catalog)?;

        let rows = self.execute(&statement).await?;
        let body = match rows.first() {
            Some(row) => row.try_get::<_, Option<JsonValue>>(0)?,
            None => None,
        };
        Ok(body.map_or_else(|| "[]".to_string(), |v| v.to_string()))
    }

    /// Fetch one row by key as a JSON object; `None` when it does not exist
    pub async fn get_single(&self, table: &str, id: &str) -> ApiResult<Option<String>> {
        let catalog = self.cache.load(self.client).await?;
        let table = catalog
            .table(table)
            .ok_or_else(|| ApiError::TableNotFound(table.to_string()))?;
        let statement = query::compile_single(table, id)?;

        let rows = self.execute(&statement).await?;
        match rows.first() {
            Some(row) => Ok(Some(row.try_get::<_, JsonValue>(0)?.to_string())),
            None => Ok(None),
        }
    }

    /// Insert a JSON payload; true when a row was written
    pub async fn insert(
        &self,
        table: &str,
        payload: &JsonMap<String, JsonValue>,
    ) -> ApiResult<bool> {
        let catalog = self.cache.load(self.client).await?;
        let table = catalog
            .table(table)
            .ok_or_else(|| ApiError::TableNotFound(table.to_string()))?;
        let statement = query::compile_insert(table, payload)?;

        Ok(self.execute_count(&statement).await? > 0)
    }

    /// Update a row by key from a JSON payload; true when a row changed
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        payload: &JsonMap<String, JsonValue>,
    ) -> ApiResult<bool> {
        let catalog = self.cache.load(self.client).await?;
        let table = catalog
            .table(table)
            .ok_or_else(|| ApiError::TableNotFound(table.to_string()))?;
        let statement = query::compile_update(table, id, payload)?;

        Ok(self.execute_count(&statement).await? > 0)
    }

    /// Invoke a stored function with named arguments
    ///
    /// Void functions report no value; otherwise the first column of the
    /// first row, absent when the call produced no row.
    pub async fn call(
        &self,
        function: &str,
        args: &JsonMap<String, JsonValue>,
    ) -> ApiResult<Option<String>> {
        let catalog = self.cache.load(self.client).await?;
        let function = catalog
            .function(function)
            .ok_or_else(|| ApiError::FunctionNotFound(function.to_string()))?;
        let statement = rpc::compile_call(function, args)?;

        if function.is_void() {
            self.execute_count(&statement).await?;
            return Ok(None);
        }

        let rows = self.execute(&statement).await?;
        match rows.first() {
            Some(row) => Ok(row.try_get::<_, Option<String>>(0)?),
            None => Ok(None),
        }
    }

    async fn execute(&self, statement: &Statement) -> ApiResult<Vec<Row>> {
        let prepared = self.prepare(statement).await?;
        let params = param_refs(statement);
        Ok(self.client.query(&prepared, &params).await?)
    }

    async fn execute_count(&self, statement: &Statement) -> ApiResult<u64> {
        let prepared = self.prepare(statement).await?;
        let params = param_refs(statement);
        Ok(self.client.execute(&prepared, &params).await?)
    }

    /// Security context first, then prepare with the compiled types
    async fn prepare(&self, statement: &Statement) -> ApiResult<tokio_postgres::Statement> {
        prepare_session(self.client, &self.identity).await?;
        debug!(sql = %statement.sql, params = statement.params.len(), "executing compiled statement");
        Ok(self
            .client
            .prepare_typed(&statement.sql, &statement.types)
            .await?)
    }
}

fn param_refs(statement: &Statement) -> Vec<&(dyn ToSql + Sync)> {
    statement
        .params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}
