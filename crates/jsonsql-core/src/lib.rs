//! # jsonsql-core
//!
//! SQL to JSONSQL transpiler and table schema model.
//!
//! This crate provides:
//! - A hand-written lexer and recursive descent parser with Pratt expression
//!   parsing for single SELECT, INSERT, UPDATE and DELETE statements
//! - A lowering pass producing the JSONSQL request objects consumed by a
//!   remote JSON-RPC database API
//! - The operator mapping table shared by every JSONSQL producer
//! - Table schemas describing how positional remote rows map to typed records
//!
//! ## Transpiling
//!
//! ```rust
//! use jsonsql_core::{transpile, Method};
//! use serde_json::json;
//!
//! let request = transpile("SELECT id, title FROM movies WHERE year >= 2000 LIMIT 10").unwrap();
//! assert_eq!(request.method, Method::Select);
//! assert_eq!(
//!     request.params,
//!     json!({
//!         "from": "movies",
//!         "data": ["id", "title"],
//!         "where": {"gte": ["year", 2000]},
//!         "limit": 10
//!     })
//! );
//! ```
//!
//! ## Positional projection
//!
//! ```rust
//! use jsonsql_core::schema::{FieldDefinition, FieldType, TableSchema};
//! use serde_json::json;
//!
//! let schema = TableSchema::new(
//!     "movies",
//!     [
//!         FieldDefinition::new(0, "id", FieldType::Integer),
//!         FieldDefinition::new(1, "title", FieldType::String),
//!     ],
//! )
//! .unwrap();
//!
//! let record = schema.project(&[json!(1), json!("Heat"), json!("extra")]).unwrap();
//! assert_eq!(record.names().collect::<Vec<_>>(), vec!["id", "title"]);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod request;
pub mod schema;
pub mod transpile;

pub use ast::Statement;
pub use error::{TranspileError, UnsupportedFeatureError};
pub use lexer::{Lexer, Span, Token, TokenKind};
pub use operators::{OperatorClass, OperatorError};
pub use parser::{parse_sql, ParseError, Parser, MAX_EXPRESSION_DEPTH, MAX_STATEMENT_LENGTH};
pub use request::{build_insert_data, extract_table_name, infer_method, JsonSqlRequest, Method};
pub use schema::{SchemaRegistry, TableSchema};
pub use transpile::{lower_expression, transpile, Transpiler};
