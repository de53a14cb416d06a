//! SQL intermediate representation
//!
//! Compiled queries are assembled as a small tree (projection pairs, joins,
//! predicates, order keys, pagination) and rendered once at the end, so each
//! clause can be built and tested independently of string formatting.

use crate::request::{FilterOp, SortDir};

/// One `'key', expr` pair of a `json_build_object` constructor
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    /// Externally-facing key
    pub key: String,
    pub expr: Expr,
}

impl Pair {
    pub fn new(key: impl Into<String>, expr: Expr) -> Self {
        Self {
            key: key.into(),
            expr,
        }
    }
}

/// Value side of a projection pair
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Qualified column reference
    Column { table: String, column: String },
    /// Nested single-row object (belongs-to expansion)
    Object(Vec<Pair>),
    /// Correlated array subquery (has-many expansion): all rows of `table`
    /// whose `fk_column` equals the parent's key column
    ArraySubquery {
        table: String,
        pairs: Vec<Pair>,
        fk_column: String,
        parent_table: String,
        parent_key: String,
    },
}

/// An inner join introduced by a belongs-to relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Joined (referenced) table
    pub table: String,
    /// Key column on the joined table
    pub key: String,
    /// Table carrying the foreign key
    pub fk_table: String,
    /// Foreign-key column
    pub fk_column: String,
}

/// One conjunct of the WHERE clause; `ordinal` is its `$n` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub table: String,
    pub column: String,
    pub op: FilterOp,
    pub ordinal: usize,
}

/// One ORDER BY key (top level only; nested selections are never sorted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub table: String,
    pub column: String,
    pub dir: SortDir,
}

/// Tree form of a compiled read query
///
/// Renders to the single-scalar shape the data API returns verbatim:
/// `SELECT json_agg(json_build_object(...) [ORDER BY ...]) FROM t
/// [JOIN ...] [WHERE ...] OFFSET o LIMIT l`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Primary table
    pub from: String,
    /// Per-row object constructor pairs
    pub pairs: Vec<Pair>,
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderKey>,
    /// Row offset (`page * size`)
    pub offset: i64,
    /// Page size
    pub limit: i64,
}

impl SelectQuery {
    /// Render the tree into final SQL text
    pub fn render(&self) -> String {
        let mut sql = String::from("SELECT json_agg(json_build_object(");
        render_pairs(&mut sql, &self.pairs);
        sql.push(')');

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, key) in self.order.iter().enumerate() {
                if i > 0 {
                    sql.push(',');
                }
                sql.push_str(&format!(
                    "{}.{} {}",
                    key.table,
                    key.column,
                    key.dir.as_sql()
                ));
            }
        }

        sql.push_str(&format!(") FROM {}", self.from));

        for join in &self.joins {
            sql.push_str(&format!(
                " JOIN {} ON {}.{} = {}.{}",
                join.table, join.table, join.key, join.fk_table, join.fk_column
            ));
        }

        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            for (i, p) in self.predicates.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                sql.push_str(&format!(
                    "{}.{} {} ${}",
                    p.table,
                    p.column,
                    p.op.as_sql(),
                    p.ordinal
                ));
            }
        }

        sql.push_str(&format!(" OFFSET {} LIMIT {}", self.offset, self.limit));
        sql
    }
}

/// Render pairs into an in-progress `json_build_object` argument list
pub fn render_pairs(sql: &mut String, pairs: &[Pair]) {
    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str(&format!("'{}',", pair.key.replace('\'', "''")));
        render_expr(sql, &pair.expr);
    }
}

fn render_expr(sql: &mut String, expr: &Expr) {
    match expr {
        Expr::Column { table, column } => {
            sql.push_str(&format!("{table}.{column}"));
        }
        Expr::Object(pairs) => {
            sql.push_str("json_build_object(");
            render_pairs(sql, pairs);
            sql.push(')');
        }
        Expr::ArraySubquery {
            table,
            pairs,
            fk_column,
            parent_table,
            parent_key,
        } => {
            sql.push_str("(SELECT json_agg(json_build_object(");
            render_pairs(sql, pairs);
            sql.push_str(&format!(
                ")) FROM {table} WHERE {table}.{fk_column} = {parent_table}.{parent_key})"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, column: &str) -> Expr {
        Expr::Column {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    fn base_query() -> SelectQuery {
        SelectQuery {
            from: "posts".to_string(),
            pairs: vec![
                Pair::new("id", col("posts", "id")),
                Pair::new("title", col("posts", "title")),
            ],
            joins: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            offset: 0,
            limit: 25,
        }
    }

    #[test]
    fn test_render_flat_query() {
        let sql = base_query().render();
        assert_eq!(
            sql,
            "SELECT json_agg(json_build_object('id',posts.id,'title',posts.title)) \
             FROM posts OFFSET 0 LIMIT 25"
        );
    }

    #[test]
    fn test_render_order_inside_aggregate() {
        let mut q = base_query();
        q.order.push(OrderKey {
            table: "posts".to_string(),
            column: "title".to_string(),
            dir: SortDir::Desc,
        });
        let sql = q.render();
        assert!(sql.contains("json_build_object('id',posts.id,'title',posts.title) ORDER BY posts.title DESC)"));
        // The ORDER BY belongs to json_agg, not the outer statement
        assert!(sql.contains(") FROM posts"));
    }

    #[test]
    fn test_render_join_and_nested_object() {
        let mut q = base_query();
        q.joins.push(Join {
            table: "users".to_string(),
            key: "id".to_string(),
            fk_table: "posts".to_string(),
            fk_column: "user_id".to_string(),
        });
        q.pairs.push(Pair::new(
            "users",
            Expr::Object(vec![Pair::new("name", col("users", "name"))]),
        ));

        let sql = q.render();
        assert!(sql.contains(" JOIN users ON users.id = posts.user_id"));
        assert!(sql.contains("'users',json_build_object('name',users.name)"));
    }

    #[test]
    fn test_render_array_subquery() {
        let mut q = base_query();
        q.pairs.push(Pair::new(
            "comments",
            Expr::ArraySubquery {
                table: "comments".to_string(),
                pairs: vec![Pair::new("body", col("comments", "body"))],
                fk_column: "post_id".to_string(),
                parent_table: "posts".to_string(),
                parent_key: "id".to_string(),
            },
        ));

        let sql = q.render();
        assert!(sql.contains(
            "'comments',(SELECT json_agg(json_build_object('body',comments.body)) \
             FROM comments WHERE comments.post_id = posts.id)"
        ));
    }

    #[test]
    fn test_render_predicates_with_ordinals() {
        let mut q = base_query();
        q.predicates.push(Predicate {
            table: "posts".to_string(),
            column: "title".to_string(),
            op: FilterOp::Like,
            ordinal: 1,
        });
        q.predicates.push(Predicate {
            table: "posts".to_string(),
            column: "id".to_string(),
            op: FilterOp::Gt,
            ordinal: 2,
        });

        let sql = q.render();
        assert!(sql.contains(" WHERE posts.title LIKE $1 AND posts.id > $2"));
    }

    #[test]
    fn test_render_pagination() {
        let mut q = base_query();
        q.offset = 20;
        q.limit = 10;
        assert!(q.render().ends_with(" OFFSET 20 LIMIT 10"));
    }
}
