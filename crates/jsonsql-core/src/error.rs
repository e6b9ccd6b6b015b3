//! Transpiler error types.

use crate::lexer::Span;
use crate::operators::OperatorError;
use crate::parser::ParseError;

/// Valid SQL that has no JSONSQL encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported feature: {feature}{}", fragment.as_ref().map(|f| format!(" near '{f}'")).unwrap_or_default())]
pub struct UnsupportedFeatureError {
    /// Short name of the construct.
    pub feature: String,
    /// The offending source text, when known.
    pub fragment: Option<String>,
    /// Location of the construct, when known.
    pub span: Option<Span>,
}

impl UnsupportedFeatureError {
    /// Creates an error without source location.
    #[must_use]
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            fragment: None,
            span: None,
        }
    }

    /// Creates an error pointing at `span` within `source`.
    #[must_use]
    pub fn at(feature: impl Into<String>, span: Span, source: &str) -> Self {
        Self {
            feature: feature.into(),
            fragment: span.slice(source).map(str::to_string),
            span: Some(span),
        }
    }
}

impl From<OperatorError> for UnsupportedFeatureError {
    fn from(err: OperatorError) -> Self {
        Self::new(err.to_string())
    }
}

/// Any failure turning SQL text into a JSONSQL request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranspileError {
    /// Malformed SQL.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Well-formed SQL the remote API cannot express.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFeatureError),
}

impl From<OperatorError> for TranspileError {
    fn from(err: OperatorError) -> Self {
        Self::Unsupported(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_includes_fragment() {
        let sql = "SELECT a || b FROM t";
        let err = UnsupportedFeatureError::at("operator ||", Span::new(7, 13), sql);
        assert_eq!(err.fragment.as_deref(), Some("a || b"));
        assert_eq!(
            err.to_string(),
            "Unsupported feature: operator || near 'a || b'"
        );
        assert_eq!(
            UnsupportedFeatureError::new("UNION").to_string(),
            "Unsupported feature: UNION"
        );
    }
}
