//! SQL statement AST types.

use super::expression::Expression;
use crate::lexer::Span;

/// Order direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order (default).
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

/// An ORDER BY clause entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// The expression to order by.
    pub expr: Expression,
    /// The direction (ASC or DESC).
    pub direction: OrderDirection,
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT OUTER JOIN.
    Left,
    /// RIGHT OUTER JOIN.
    Right,
    /// FULL OUTER JOIN.
    Full,
    /// CROSS JOIN.
    Cross,
}

impl JoinType {
    /// Returns the JSONSQL join kind.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Full => "full",
            Self::Cross => "cross",
        }
    }
}

/// A named table with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Table name, `schema.table` when qualified.
    pub name: String,
    /// Alias.
    pub alias: Option<String>,
}

impl TableRef {
    /// Creates a table reference without alias.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }
}

/// How a JOIN matches rows.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    /// `ON <expr>`.
    On(Expression),
    /// `USING (a, b)`.
    Using(Vec<String>),
    /// No constraint (CROSS JOIN).
    None,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// The type of join.
    pub join_type: JoinType,
    /// The table to join.
    pub table: TableRef,
    /// The join condition.
    pub constraint: JoinConstraint,
}

/// The FROM clause: a base table followed by zero or more joins.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    /// The first table.
    pub table: TableRef,
    /// Joined tables, in source order.
    pub joins: Vec<JoinClause>,
}

/// A column in a SELECT or RETURNING list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    /// The expression.
    pub expr: Expression,
    /// Column alias.
    pub alias: Option<String>,
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Whether to select DISTINCT values.
    pub distinct: bool,
    /// The columns to select.
    pub columns: Vec<SelectColumn>,
    /// The FROM clause.
    pub from: Option<FromClause>,
    /// The WHERE clause.
    pub where_clause: Option<Expression>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expression>,
    /// HAVING clause.
    pub having: Option<Expression>,
    /// ORDER BY clauses.
    pub order_by: Vec<OrderBy>,
    /// LIMIT clause.
    pub limit: Option<Expression>,
    /// OFFSET clause.
    pub offset: Option<Expression>,
}

impl SelectStatement {
    /// Returns true if the statement aggregates rows.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.columns.iter().any(|c| c.expr.contains_aggregate())
    }
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Table name.
    pub table: String,
    /// Column names (optional).
    pub columns: Vec<String>,
    /// Rows from the VALUES clause.
    pub rows: Vec<Vec<Expression>>,
    /// RETURNING list.
    pub returning: Vec<SelectColumn>,
}

/// An assignment in UPDATE SET.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAssignment {
    /// Column name.
    pub column: String,
    /// Value expression.
    pub value: Expression,
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Table name.
    pub table: String,
    /// SET assignments.
    pub assignments: Vec<UpdateAssignment>,
    /// WHERE clause.
    pub where_clause: Option<Expression>,
    /// RETURNING list.
    pub returning: Vec<SelectColumn>,
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Table name.
    pub table: String,
    /// WHERE clause.
    pub where_clause: Option<Expression>,
    /// RETURNING list.
    pub returning: Vec<SelectColumn>,
}

/// A SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT statement.
    Select(SelectStatement),
    /// INSERT statement.
    Insert(InsertStatement),
    /// UPDATE statement.
    Update(UpdateStatement),
    /// DELETE statement.
    Delete(DeleteStatement),
    /// A syntactically valid statement using a construct with no JSONSQL
    /// encoding (UNION, WITH, INSERT ... SELECT, ...).
    Unsupported {
        /// Short name of the first offending construct.
        feature: String,
        /// Location of the construct in the source text.
        span: Span,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggregateFunction, ComparisonOp};

    #[test]
    fn test_join_type_key() {
        assert_eq!(JoinType::Inner.key(), "inner");
        assert_eq!(JoinType::Left.key(), "left");
    }

    #[test]
    fn test_select_is_aggregate() {
        let mut select = SelectStatement {
            distinct: false,
            columns: vec![SelectColumn {
                expr: Expression::column("id"),
                alias: None,
            }],
            from: Some(FromClause {
                table: TableRef::new("movies"),
                joins: vec![],
            }),
            where_clause: None,
            group_by: vec![],
            having: None,
            order_by: vec![],
            limit: None,
            offset: None,
        };
        assert!(!select.is_aggregate());

        select.columns.push(SelectColumn {
            expr: Expression::Aggregate {
                function: AggregateFunction::Count,
                arg: None,
                distinct: false,
            },
            alias: None,
        });
        assert!(select.is_aggregate());

        select.columns.truncate(1);
        select.where_clause =
            Some(Expression::column("id").compare(ComparisonOp::Gt, Expression::integer(1)));
        assert!(!select.is_aggregate());
    }
}
