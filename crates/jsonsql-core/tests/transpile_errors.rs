//! Tests for parse errors and unsupported constructs.

mod common;
use common::*;

use jsonsql_core::MAX_STATEMENT_LENGTH;

#[test]
fn error_empty_input() {
    assert!(parse_err("").message.contains("Empty statement"));
    assert!(parse_err("  ;  ").message.contains("Empty statement"));
}

#[test]
fn error_incomplete_statements() {
    let _ = parse_err("SELECT");
    let _ = parse_err("SELECT * FROM");
    let _ = parse_err("SELECT (1 + 2 FROM t");
    let _ = parse_err("INSERT INTO t VALUES");
    let _ = parse_err("UPDATE t SET");
}

#[test]
fn error_unknown_statement() {
    let _ = parse_err("TRUNCATE users");
}

#[test]
fn error_multiple_statements() {
    let err = parse_err("SELECT id FROM a; SELECT id FROM b");
    assert!(err.message.contains("Multiple statements"));
}

#[test]
fn error_statement_too_long() {
    let long = format!("SELECT id FROM t WHERE name = '{}'", "x".repeat(MAX_STATEMENT_LENGTH));
    let _ = parse_err(&long);
}

#[test]
fn error_values_width_mismatch() {
    let err = parse_err("INSERT INTO t (a, b) VALUES (1)");
    assert!(err.message.contains("VALUES row has 1 values but 2 columns"));
}

#[test]
fn error_unterminated_string_keeps_position() {
    let err = parse_err("SELECT id FROM t WHERE name = 'abc");
    assert!(err.span.start >= 30);
}

#[test]
fn unsupported_statement_constructs() {
    assert!(unsupported("SELECT id FROM a UNION SELECT id FROM b").feature.contains("UNION"));
    assert!(unsupported("WITH x AS (SELECT id FROM a) SELECT id FROM x").feature.contains("WITH"));
    let _ = unsupported("INSERT INTO a SELECT * FROM b");
    let _ = unsupported("SELECT id FROM (SELECT id FROM a) s");
}

#[test]
fn unsupported_expression_constructs_carry_fragment() {
    let err = unsupported("SELECT CASE WHEN a = 1 THEN 'x' END FROM t");
    assert_eq!(err.fragment.as_deref(), Some("CASE WHEN a = 1 THEN 'x' END"));

    let err = unsupported("SELECT id FROM t WHERE id = ?");
    assert_eq!(err.fragment.as_deref(), Some("?"));

    let err = unsupported("SELECT UPPER(title) FROM t");
    assert!(err.fragment.is_some());

    let err = unsupported("SELECT id FROM t WHERE id IN (SELECT id FROM u)");
    assert!(err.feature.contains("subquery"));
}

#[test]
fn unsupported_select_without_from() {
    assert!(unsupported("SELECT 1 + 1").feature.contains("FROM"));
}

#[test]
fn unsupported_order_by_expression() {
    let _ = unsupported("SELECT id FROM t ORDER BY a + b");
}

#[test]
fn error_expression_nested_too_deeply() {
    let nested = |depth: usize| {
        format!(
            "SELECT id FROM t WHERE {}a = 1{}",
            "(".repeat(depth),
            ")".repeat(depth)
        )
    };
    for depth in [250, 2000] {
        let err = parse_err(&nested(depth));
        assert!(err.message.contains("nested too deeply"), "{}", err.message);
    }

    let negations = format!("SELECT id FROM t WHERE {}a = 1", "NOT ".repeat(5000));
    assert!(parse_err(&negations).message.contains("nested too deeply"));

    let sum = format!("SELECT id FROM t WHERE a = {}1", "1 + ".repeat(2000));
    assert!(parse_err(&sum).message.contains("nested too deeply"));
}

#[test]
fn moderate_nesting_and_long_conjunctions_still_parse() {
    let nested = format!("SELECT id FROM t WHERE {}a = 1{}", "(".repeat(40), ")".repeat(40));
    assert_eq!(params(&nested)["where"], serde_json::json!({"eq": ["a", 1]}));

    let terms: Vec<String> = (0..500).map(|i| format!("a{i} = {i}")).collect();
    let conjunction = format!("SELECT id FROM t WHERE {}", terms.join(" AND "));
    let filter = params(&conjunction);
    assert_eq!(filter["where"]["and"].as_array().map(Vec::len), Some(500));
}
