//! Session security context
//!
//! Maps the caller's identity into session-scoped database state so the
//! engine's row-level security and audit layers see the true caller even
//! though statements run over a shared service connection. Applied once per
//! request, after the connection is handed over and before any data
//! statement; never cached, because identity varies per request while the
//! connection is reused.

use tokio_postgres::Client;
use tracing::debug;

use crate::error::ApiResult;

/// Role assumed when the caller presents no identity
pub const ANONYMOUS_ROLE: &str = "web_anonymous";

/// Caller identity consumed from the authentication collaborator
///
/// All claims optional; an empty identity is the anonymous caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Role claim; `None` falls back to the anonymous role
    pub role: Option<String>,
    /// Display-name claim
    pub name: Option<String>,
    /// Email claim
    pub email: Option<String>,
}

impl CallerIdentity {
    /// The anonymous caller
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Identity with a role claim
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// Effective database role for this caller
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(ANONYMOUS_ROLE)
    }
}

/// Render the session-preparation batch for `identity`
///
/// Sets the active role plus the `jwt.claims.*` session variables the
/// engine's policies and audit triggers read. `SET` takes no bind
/// parameters, so identifiers and literals are quoted inline.
pub fn session_setup_sql(identity: &CallerIdentity) -> String {
    let role = identity.role();

    let mut sql = format!(
        "SET ROLE {}; SET jwt.claims.role TO {};",
        quote_ident(role),
        quote_literal(role)
    );

    if let Some(name) = identity.name.as_deref().filter(|n| !n.is_empty()) {
        sql.push_str(&format!(" SET jwt.claims.name TO {};", quote_literal(name)));
    }
    if let Some(email) = identity.email.as_deref().filter(|e| !e.is_empty()) {
        sql.push_str(&format!(
            " SET jwt.claims.email TO {};",
            quote_literal(email)
        ));
    }

    sql
}

/// Apply the security context to an open session
///
/// Must run before any compiled statement in the same unit of work.
pub async fn prepare_session(client: &Client, identity: &CallerIdentity) -> ApiResult<()> {
    let batch = session_setup_sql(identity);
    debug!(role = identity.role(), "preparing session context");
    client.batch_execute(&batch).await?;
    Ok(())
}

/// Quote an identifier (double quotes, embedded quotes doubled)
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a literal (single quotes, embedded quotes doubled)
fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity_sets_anonymous_role() {
        let sql = session_setup_sql(&CallerIdentity::anonymous());
        assert_eq!(
            sql,
            "SET ROLE \"web_anonymous\"; SET jwt.claims.role TO 'web_anonymous';"
        );
    }

    #[test]
    fn test_full_identity() {
        let identity = CallerIdentity {
            role: Some("editor".to_string()),
            name: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
        };
        let sql = session_setup_sql(&identity);
        assert_eq!(
            sql,
            "SET ROLE \"editor\"; SET jwt.claims.role TO 'editor'; \
             SET jwt.claims.name TO 'Ada Lovelace'; \
             SET jwt.claims.email TO 'ada@example.com';"
        );
    }

    #[test]
    fn test_empty_claims_are_skipped() {
        let identity = CallerIdentity {
            role: Some("editor".to_string()),
            name: Some(String::new()),
            email: None,
        };
        let sql = session_setup_sql(&identity);
        assert!(!sql.contains("jwt.claims.name"));
        assert!(!sql.contains("jwt.claims.email"));
    }

    #[test]
    fn test_quoting_hostile_claims() {
        let identity = CallerIdentity {
            role: Some("ed'; DROP TABLE users; --".to_string()),
            name: Some("O'Brien".to_string()),
            email: None,
        };
        let sql = session_setup_sql(&identity);
        assert!(sql.contains("'ed''; DROP TABLE users; --'"));
        assert!(sql.contains("'O''Brien'"));
    }

    #[test]
    fn test_role_fallback() {
        assert_eq!(CallerIdentity::anonymous().role(), ANONYMOUS_ROLE);
        assert_eq!(CallerIdentity::with_role("editor").role(), "editor");
    }
}
