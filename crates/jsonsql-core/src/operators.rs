//! Operator Mapping Table.
//!
//! Static mapping from SQL operator spellings to JSONSQL operator keys, plus
//! builders that produce the JSONSQL array encoding `{key: [left, right]}`.
//!
//! Keyword spellings (`EQ`, `and`, `is not`) are matched case-insensitively;
//! symbolic spellings (`=`, `<>`, `%`) are matched exactly.

use serde_json::{json, Value};

/// Operator families understood by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorClass {
    /// `eq`, `neq`, `gt`, `gte`, `lt`, `lte`, `is`, `is_not`.
    Comparison,
    /// `and`, `or`, `not`.
    Logical,
    /// `like`, `ilike`.
    Pattern,
    /// `in`.
    Set,
    /// `add`, `sub`, `mul`, `div`, `mod`.
    Math,
}

/// Error raised when an operator has no JSONSQL mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    /// The spelling is not in the table for the requested class.
    #[error("unmapped {class:?} operator '{op}'")]
    Unmapped {
        /// Operator family that was searched.
        class: OperatorClass,
        /// The offending spelling.
        op: String,
    },
    /// A logical operator received the wrong number of operands.
    #[error("operator '{op}' expects {expected} operand(s), got {got}")]
    Arity {
        /// The operator spelling.
        op: String,
        /// Human-readable expected count.
        expected: &'static str,
        /// Operands supplied.
        got: usize,
    },
}

const COMPARISON_SYMBOLS: &[(&str, &str)] = &[
    ("=", "eq"),
    ("==", "eq"),
    ("!=", "neq"),
    ("<>", "neq"),
    (">", "gt"),
    (">=", "gte"),
    ("<", "lt"),
    ("<=", "lte"),
];

const COMPARISON_KEYWORDS: &[(&str, &str)] = &[
    ("EQ", "eq"),
    ("NEQ", "neq"),
    ("GT", "gt"),
    ("GTE", "gte"),
    ("LT", "lt"),
    ("LTE", "lte"),
    ("IS", "is"),
    ("IS_NOT", "is_not"),
];

const LOGICAL_KEYWORDS: &[(&str, &str)] = &[("AND", "and"), ("OR", "or"), ("NOT", "not")];

const PATTERN_KEYWORDS: &[(&str, &str)] = &[("LIKE", "like"), ("ILIKE", "ilike")];

const SET_KEYWORDS: &[(&str, &str)] = &[("IN", "in")];

const MATH_SYMBOLS: &[(&str, &str)] = &[
    ("+", "add"),
    ("-", "sub"),
    ("*", "mul"),
    ("/", "div"),
    ("%", "mod"),
];

const MATH_KEYWORDS: &[(&str, &str)] = &[
    ("ADD", "add"),
    ("SUB", "sub"),
    ("MUL", "mul"),
    ("DIV", "div"),
    ("MOD", "mod"),
];

fn is_keyword_spelling(op: &str) -> bool {
    op.chars()
        .all(|c| c.is_ascii_alphabetic() || c == '_' || c == ' ')
}

/// Normalizes a keyword spelling: upper-case, inner whitespace collapsed to `_`.
fn normalize_keyword(op: &str) -> String {
    op.split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn lookup(op: &str, symbols: &[(&str, &'static str)], keywords: &[(&str, &'static str)]) -> Option<&'static str> {
    if is_keyword_spelling(op) {
        let normalized = normalize_keyword(op);
        keywords
            .iter()
            .find(|(spelling, _)| *spelling == normalized)
            .map(|(_, key)| *key)
    } else {
        symbols
            .iter()
            .find(|(spelling, _)| *spelling == op)
            .map(|(_, key)| *key)
    }
}

/// Returns the JSONSQL key for a comparison operator.
#[must_use]
pub fn comparison_key(op: &str) -> Option<&'static str> {
    lookup(op, COMPARISON_SYMBOLS, COMPARISON_KEYWORDS)
}

/// Returns the JSONSQL key for a logical operator.
#[must_use]
pub fn logical_key(op: &str) -> Option<&'static str> {
    lookup(op, &[], LOGICAL_KEYWORDS)
}

/// Returns the JSONSQL key for a pattern operator.
#[must_use]
pub fn pattern_key(op: &str) -> Option<&'static str> {
    lookup(op, &[], PATTERN_KEYWORDS)
}

/// Returns the JSONSQL key for a set-membership operator.
#[must_use]
pub fn set_key(op: &str) -> Option<&'static str> {
    lookup(op, &[], SET_KEYWORDS)
}

/// Returns the JSONSQL key for an arithmetic operator.
#[must_use]
pub fn math_key(op: &str) -> Option<&'static str> {
    lookup(op, MATH_SYMBOLS, MATH_KEYWORDS)
}

/// Classifies any operator spelling, searching every family.
#[must_use]
pub fn operator_key(op: &str) -> Option<(OperatorClass, &'static str)> {
    comparison_key(op)
        .map(|key| (OperatorClass::Comparison, key))
        .or_else(|| logical_key(op).map(|key| (OperatorClass::Logical, key)))
        .or_else(|| pattern_key(op).map(|key| (OperatorClass::Pattern, key)))
        .or_else(|| set_key(op).map(|key| (OperatorClass::Set, key)))
        .or_else(|| math_key(op).map(|key| (OperatorClass::Math, key)))
}

fn unmapped(class: OperatorClass, op: &str) -> OperatorError {
    OperatorError::Unmapped {
        class,
        op: op.to_string(),
    }
}

/// Builds `{key: [left, right]}` for a comparison.
///
/// # Errors
///
/// Returns `OperatorError::Unmapped` if `op` is not a comparison operator.
pub fn build_comparison(
    op: &str,
    left: impl Into<Value>,
    right: impl Into<Value>,
) -> Result<Value, OperatorError> {
    let key = comparison_key(op).ok_or_else(|| unmapped(OperatorClass::Comparison, op))?;
    Ok(json!({ key: [left.into(), right.into()] }))
}

/// Builds `{"and"|"or": [..]}` (two or more operands) or `{"not": [operand]}`.
///
/// # Errors
///
/// Returns `OperatorError::Unmapped` for unknown operators and
/// `OperatorError::Arity` when the operand count does not fit the operator.
pub fn build_logical(op: &str, operands: Vec<Value>) -> Result<Value, OperatorError> {
    let key = logical_key(op).ok_or_else(|| unmapped(OperatorClass::Logical, op))?;
    let arity_ok = if key == "not" {
        operands.len() == 1
    } else {
        operands.len() >= 2
    };
    if !arity_ok {
        return Err(OperatorError::Arity {
            op: op.to_string(),
            expected: if key == "not" { "exactly 1" } else { "at least 2" },
            got: operands.len(),
        });
    }
    Ok(json!({ key: operands }))
}

/// Builds `{"like"|"ilike": [field, pattern]}`.
///
/// # Errors
///
/// Returns `OperatorError::Unmapped` if `op` is not a pattern operator.
pub fn build_pattern(
    op: &str,
    field: impl Into<Value>,
    pattern: impl Into<Value>,
) -> Result<Value, OperatorError> {
    let key = pattern_key(op).ok_or_else(|| unmapped(OperatorClass::Pattern, op))?;
    Ok(json!({ key: [field.into(), pattern.into()] }))
}

/// Builds `{"in": [field, [values..]]}`.
///
/// # Errors
///
/// Returns `OperatorError::Unmapped` if `op` is not a set operator.
pub fn build_set(op: &str, field: impl Into<Value>, values: Vec<Value>) -> Result<Value, OperatorError> {
    let key = set_key(op).ok_or_else(|| unmapped(OperatorClass::Set, op))?;
    Ok(json!({ key: [field.into(), Value::Array(values)] }))
}

/// Builds `{"add"|"sub"|..: [left, right]}`.
///
/// # Errors
///
/// Returns `OperatorError::Unmapped` if `op` is not an arithmetic operator.
pub fn build_math(
    op: &str,
    left: impl Into<Value>,
    right: impl Into<Value>,
) -> Result<Value, OperatorError> {
    let key = math_key(op).ok_or_else(|| unmapped(OperatorClass::Math, op))?;
    Ok(json!({ key: [left.into(), right.into()] }))
}
