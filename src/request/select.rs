//! Select mini-language parser
//!
//! Grammar: a comma-separated list of field tokens, where a token is either
//! a bare column name, `table(col,col)` or `table.as.alias(col,col)`. Exactly
//! one nesting level is supported; a parenthesized token inside a relation
//! entry is rejected rather than silently flattened.

use crate::error::{ApiError, ApiResult};

/// One `table(columns)` relation entry of a select expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectEntry {
    /// Related table name
    pub table: String,
    /// Output key for the nested projection (defaults to the table name)
    pub alias: String,
    /// Externally-facing column names inside the parentheses
    pub columns: Vec<String>,
}

/// Parsed select expression: flat primary columns plus relation entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectList {
    /// Columns projected from the primary table
    pub primary: Vec<String>,
    /// Relation projections in the order they appeared
    pub entries: Vec<SelectEntry>,
}

/// Parse a select expression
///
/// Everything outside parentheses accumulates into the primary column list;
/// each parenthesized group becomes a relation entry. An empty expression
/// yields an empty list (the caller keeps every primary column).
pub fn parse_select(input: &str) -> ApiResult<SelectList> {
    let mut list = SelectList::default();
    let mut rest = input.trim();

    while !rest.is_empty() {
        rest = rest.trim_start_matches([',', ' ']);
        if rest.is_empty() {
            break;
        }

        let next_comma = rest.find(',');
        let next_open = rest.find('(');

        let is_relation = match (next_open, next_comma) {
            (Some(open), Some(comma)) => open < comma,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if is_relation {
            let open = next_open.unwrap();
            let close = rest.find(')').ok_or_else(|| {
                ApiError::Compile(format!("unterminated selection group in '{input}'"))
            })?;
            if close < open {
                return Err(ApiError::Compile(format!(
                    "unbalanced parentheses in '{input}'"
                )));
            }

            let inner = &rest[open + 1..close];
            if inner.contains('(') {
                return Err(ApiError::Compile(format!(
                    "selection '{}' nests deeper than one level",
                    &rest[..=close]
                )));
            }

            let (table, alias) = parse_head(rest[..open].trim());
            list.entries.push(SelectEntry {
                table,
                alias,
                columns: split_fields(inner),
            });
            rest = &rest[close + 1..];
        } else {
            let end = next_comma.unwrap_or(rest.len());
            let field = rest[..end].trim();
            if !field.is_empty() {
                list.primary.push(field.to_string());
            }
            rest = &rest[end..];
        }
    }

    Ok(list)
}

/// Split `table` or `table.as.alias` before a parenthesized group
fn parse_head(head: &str) -> (String, String) {
    match head.split_once(".as.") {
        Some((table, alias)) => (table.trim().to_string(), alias.trim().to_string()),
        None => (head.to_string(), head.to_string()),
    }
}

fn split_fields(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_columns() {
        let list = parse_select("id,title, body").unwrap();
        assert_eq!(list.primary, vec!["id", "title", "body"]);
        assert!(list.entries.is_empty());
    }

    #[test]
    fn test_empty_select() {
        let list = parse_select("").unwrap();
        assert!(list.primary.is_empty());
        assert!(list.entries.is_empty());
    }

    #[test]
    fn test_relation_entry() {
        let list = parse_select("id,title,users(name,email)").unwrap();
        assert_eq!(list.primary, vec!["id", "title"]);
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].table, "users");
        assert_eq!(list.entries[0].alias, "users");
        assert_eq!(list.entries[0].columns, vec!["name", "email"]);
    }

    #[test]
    fn test_relation_with_alias() {
        let list = parse_select("users.as.author(name)").unwrap();
        assert_eq!(list.entries[0].table, "users");
        assert_eq!(list.entries[0].alias, "author");
    }

    #[test]
    fn test_columns_after_relation_entry() {
        let list = parse_select("users(name),id,comments(body),title").unwrap();
        assert_eq!(list.primary, vec!["id", "title"]);
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.entries[1].table, "comments");
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let err = parse_select("users(name,posts(title))").unwrap_err();
        assert!(matches!(err, ApiError::Compile(_)));
        assert!(err.to_string().contains("one level"));
    }

    #[test]
    fn test_unterminated_group_rejected() {
        let err = parse_select("users(name").unwrap_err();
        assert!(matches!(err, ApiError::Compile(_)));
    }

    #[test]
    fn test_stray_close_rejected() {
        let err = parse_select("users)name(").unwrap_err();
        assert!(matches!(err, ApiError::Compile(_)));
    }
}
