//! Expression AST types.
//!
//! Expressions are grouped by the JSONSQL operator family they lower to.
//! Constructs the remote API cannot express still parse, and are kept as
//! [`Expression::Unsupported`] so the transpiler can report them with their
//! source fragment.

use crate::lexer::Span;

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Boolean literal.
    Boolean(bool),
    /// NULL literal.
    Null,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    IsNot,
}

impl ComparisonOp {
    /// Returns the operator spelling understood by the mapping table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Is => "IS",
            Self::IsNot => "IS_NOT",
        }
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    /// Returns the operator spelling understood by the mapping table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }
}

/// Pattern-matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOp {
    Like,
    ILike,
}

impl PatternOp {
    /// Returns the operator spelling understood by the mapping table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl MathOp {
    /// Returns the operator spelling understood by the mapping table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

/// Aggregate functions the remote API evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Returns the JSONSQL key for this aggregate.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// An SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(Literal),

    /// A column reference (optionally qualified with table name).
    Column {
        /// Table name or alias (optional).
        table: Option<String>,
        /// Column name.
        name: String,
        /// Source span.
        span: Span,
    },

    /// Wildcard (`*` or `t.*`) in a select list.
    Wildcard {
        /// Table qualifier (optional).
        table: Option<String>,
    },

    /// A binary comparison, including `IS` / `IS NOT`.
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `AND`/`OR` with two or more operands, or `NOT` with exactly one.
    Logical {
        op: LogicalOp,
        operands: Vec<Expression>,
    },

    /// `[NOT] LIKE` / `[NOT] ILIKE`.
    Pattern {
        op: PatternOp,
        negated: bool,
        expr: Box<Expression>,
        pattern: Box<Expression>,
    },

    /// `[NOT] IN (..)`.
    SetMembership {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },

    /// A binary arithmetic expression.
    Arithmetic {
        op: MathOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `[NOT] BETWEEN low AND high`.
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },

    /// Unary minus.
    Negate(Box<Expression>),

    /// An aggregate call. `arg` is `None` for `COUNT(*)`.
    Aggregate {
        function: AggregateFunction,
        arg: Option<Box<Expression>>,
        distinct: bool,
    },

    /// Valid SQL the remote API has no encoding for.
    Unsupported {
        /// Short name of the construct, e.g. `CASE expression`.
        feature: String,
        /// Location of the construct in the source text.
        span: Span,
    },
}

impl Expression {
    /// Creates a new column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            table: None,
            name: name.into(),
            span: Span::default(),
        }
    }

    /// Creates a new integer literal.
    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    /// Creates a new string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    /// Creates a NULL literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Creates a comparison expression.
    #[must_use]
    pub fn compare(self, op: ComparisonOp, right: Self) -> Self {
        Self::Comparison {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    /// Joins two expressions with `AND`/`OR`, flattening nested chains of the
    /// same connective into a single operand list.
    #[must_use]
    pub fn connect(self, op: LogicalOp, right: Self) -> Self {
        let mut operands = Vec::new();
        for side in [self, right] {
            match side {
                Self::Logical {
                    op: inner,
                    operands: nested,
                } if inner == op => operands.extend(nested),
                other => operands.push(other),
            }
        }
        Self::Logical { op, operands }
    }

    /// Wraps the expression in `NOT`.
    #[must_use]
    pub fn negate_logical(self) -> Self {
        Self::Logical {
            op: LogicalOp::Not,
            operands: vec![self],
        }
    }

    /// Returns true if this expression or any sub-expression is an aggregate.
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Comparison { left, right, .. } | Self::Arithmetic { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Self::Logical { operands, .. } => operands.iter().any(Self::contains_aggregate),
            Self::Pattern { expr, pattern, .. } => {
                expr.contains_aggregate() || pattern.contains_aggregate()
            }
            Self::SetMembership { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Self::contains_aggregate)
            }
            Self::Between {
                expr, low, high, ..
            } => expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate(),
            Self::Negate(inner) => inner.contains_aggregate(),
            Self::Literal(_)
            | Self::Column { .. }
            | Self::Wildcard { .. }
            | Self::Unsupported { .. } => false,
        }
    }
}
