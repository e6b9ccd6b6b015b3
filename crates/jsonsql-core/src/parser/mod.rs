//! SQL Parser
//!
//! A hand-written recursive descent parser with Pratt expression parsing.

mod error;
mod parser;
mod pratt;

pub use error::ParseError;
pub use parser::{parse_sql, Parser, MAX_EXPRESSION_DEPTH, MAX_STATEMENT_LENGTH};
