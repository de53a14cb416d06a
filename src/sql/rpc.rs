//! RPC compiler - stored-function calls to positional statements
//!
//! Declared parameters are bound in catalog order, one placeholder each.
//! Unlike filters and selections, a missing argument is a hard error naming
//! the parameter: a call without its required arguments cannot execute
//! meaningfully.

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::catalog::{Column, DbType, Function};
use crate::error::{ApiError, ApiResult};
use crate::sql::value::pg_param_type;
use crate::sql::{coerce, Statement};

/// Compile a call to `function` with named arguments
///
/// Value-returning calls are cast to text so the single result cell
/// transfers uniformly regardless of the declared return type; void
/// functions are executed for effect only.
pub fn compile_call(
    function: &Function,
    args: &JsonMap<String, JsonValue>,
) -> ApiResult<Statement> {
    let mut statement = Statement::new(String::new());
    let mut placeholders: Vec<String> = Vec::with_capacity(function.params.len());

    for (i, param) in function.params.iter().enumerate() {
        let value = args
            .get(&param.name)
            .ok_or_else(|| ApiError::MissingArgument(param.name.clone()))?;

        // Arguments coerce against the declared parameter type the same way
        // payload values coerce against columns.
        let ty = DbType::parse(&param.ty);
        let target = Column::new(param.name.clone(), (i + 1) as i32, ty);
        let native = coerce::coerce_json(&target, value)?;

        let ordinal = statement.push_param(native, pg_param_type(&target.ty));
        placeholders.push(format!("${ordinal}"));
    }

    let cast = if function.is_void() { "" } else { "::text" };
    statement.sql = format!("SELECT {}({}){}", function.name, placeholders.join(","), cast);
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlValue;
    use serde_json::json;

    fn login_fn() -> Function {
        Function::new("login", "text")
            .param("email", "text")
            .param("password", "text")
    }

    #[test]
    fn test_compile_call_positional_order() {
        let args = json!({"password": "hunter2", "email": "ada@example.com"});
        let stmt = compile_call(&login_fn(), args.as_object().unwrap()).unwrap();

        assert_eq!(stmt.sql, "SELECT login($1,$2)::text");
        // Catalog order, not argument-map order
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Text("ada@example.com".to_string()),
                SqlValue::Text("hunter2".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_argument_named() {
        let args = json!({"email": "ada@example.com"});
        let err = compile_call(&login_fn(), args.as_object().unwrap()).unwrap_err();
        match err {
            ApiError::MissingArgument(name) => assert_eq!(name, "password"),
            other => panic!("expected MissingArgument, got {other:?}"),
        }
    }

    #[test]
    fn test_null_argument_binds_null() {
        let f = Function::new("touch", "void").param("note", "text");
        let args = json!({"note": null});
        let stmt = compile_call(&f, args.as_object().unwrap()).unwrap();
        assert_eq!(stmt.sql, "SELECT touch($1)");
        assert_eq!(stmt.params, vec![SqlValue::Null]);
    }

    #[test]
    fn test_no_parameters() {
        let f = Function::new("ping", "text");
        let stmt = compile_call(&f, &JsonMap::new()).unwrap();
        assert_eq!(stmt.sql, "SELECT ping()::text");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_typed_arguments_coerce() {
        let f = Function::new("set_limit", "void")
            .param("account_id", "integer")
            .param("amount", "numeric");
        let args = json!({"accountId": 1, "account_id": 5, "amount": 12.5});
        let stmt = compile_call(&f, args.as_object().unwrap()).unwrap();
        assert_eq!(
            stmt.params,
            vec![SqlValue::Int(5), SqlValue::Float(12.5)]
        );
    }
}
