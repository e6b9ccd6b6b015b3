//! Abstract Syntax Tree (AST) types for SQL statements.

mod expression;
mod statement;

pub use expression::{
    AggregateFunction, ComparisonOp, Expression, Literal, LogicalOp, MathOp, PatternOp,
};
pub use statement::{
    DeleteStatement, FromClause, InsertStatement, JoinClause, JoinConstraint, JoinType, OrderBy,
    OrderDirection, SelectColumn, SelectStatement, Statement, TableRef, UpdateAssignment,
    UpdateStatement,
};
