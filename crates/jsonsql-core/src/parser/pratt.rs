//! Pratt expression parser for operator precedence.

use crate::ast::{ComparisonOp, LogicalOp, MathOp};
use crate::lexer::{Keyword, TokenKind};

/// Binding power of `NOT` as a prefix operator.
pub const NOT_BINDING_POWER: u8 = 5;

/// Binding power of unary minus.
pub const NEGATE_BINDING_POWER: u8 = 17;

/// Returns the infix binding power for a token.
///
/// Returns `(left_bp, right_bp)` where:
/// - Higher binding power = binds tighter
/// - Left associative: left_bp < right_bp
///
/// Returns `None` if the token is not an infix operator.
#[must_use]
pub const fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
    match kind {
        // Logical OR (lowest precedence)
        TokenKind::Keyword(Keyword::Or) => Some((1, 2)),

        // Logical AND
        TokenKind::Keyword(Keyword::And) => Some((3, 4)),

        // Comparison operators
        TokenKind::Eq
        | TokenKind::NotEq
        | TokenKind::Lt
        | TokenKind::LtEq
        | TokenKind::Gt
        | TokenKind::GtEq => Some((7, 8)),

        // IS, IN, BETWEEN, LIKE, and their NOT forms
        TokenKind::Keyword(
            Keyword::Is
            | Keyword::In
            | Keyword::Between
            | Keyword::Like
            | Keyword::Ilike
            | Keyword::Not,
        ) => Some((7, 8)),

        // Bitwise operators, parsed only to be reported
        TokenKind::BitOr => Some((9, 10)),
        TokenKind::BitAnd => Some((11, 12)),

        // Additive (string concat has same precedence as addition)
        TokenKind::Plus | TokenKind::Minus | TokenKind::Concat => Some((13, 14)),

        // Multiplicative
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some((15, 16)),

        _ => None,
    }
}

/// Converts a token to a comparison operator.
#[must_use]
pub const fn token_to_comparison_op(kind: &TokenKind) -> Option<ComparisonOp> {
    match kind {
        TokenKind::Eq => Some(ComparisonOp::Eq),
        TokenKind::NotEq => Some(ComparisonOp::NotEq),
        TokenKind::Lt => Some(ComparisonOp::Lt),
        TokenKind::LtEq => Some(ComparisonOp::LtEq),
        TokenKind::Gt => Some(ComparisonOp::Gt),
        TokenKind::GtEq => Some(ComparisonOp::GtEq),
        _ => None,
    }
}

/// Converts a token to an arithmetic operator.
#[must_use]
pub const fn token_to_math_op(kind: &TokenKind) -> Option<MathOp> {
    match kind {
        TokenKind::Plus => Some(MathOp::Add),
        TokenKind::Minus => Some(MathOp::Sub),
        TokenKind::Star => Some(MathOp::Mul),
        TokenKind::Slash => Some(MathOp::Div),
        TokenKind::Percent => Some(MathOp::Mod),
        _ => None,
    }
}

/// Converts a token to a binary logical connective.
#[must_use]
pub const fn token_to_logical_op(kind: &TokenKind) -> Option<LogicalOp> {
    match kind {
        TokenKind::Keyword(Keyword::And) => Some(LogicalOp::And),
        TokenKind::Keyword(Keyword::Or) => Some(LogicalOp::Or),
        _ => None,
    }
}
