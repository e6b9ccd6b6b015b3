//! Tests for the operator mapping table.

use jsonsql_core::operators::{
    build_comparison, build_logical, build_math, build_pattern, build_set, operator_key,
};
use jsonsql_core::{OperatorClass, OperatorError};
use serde_json::json;

#[test]
fn comparison_aliases_normalize() {
    let expected = json!({"eq": ["id", 5]});
    assert_eq!(build_comparison("=", "id", 5).unwrap(), expected);
    assert_eq!(build_comparison("==", "id", 5).unwrap(), expected);
    assert_eq!(build_comparison("EQ", "id", 5).unwrap(), expected);
    assert_eq!(build_comparison("eq", "id", 5).unwrap(), expected);

    let neq = json!({"neq": ["id", 5]});
    assert_eq!(build_comparison("!=", "id", 5).unwrap(), neq);
    assert_eq!(build_comparison("<>", "id", 5).unwrap(), neq);
    assert_eq!(build_comparison("NEQ", "id", 5).unwrap(), neq);
}

#[test]
fn unmapped_operators_are_errors() {
    assert!(matches!(
        build_comparison("~", "a", 1),
        Err(OperatorError::Unmapped { class: OperatorClass::Comparison, .. })
    ));
    assert!(build_math("^", "a", 1).is_err());
    assert!(build_logical("XOR", vec![json!(1), json!(2)]).is_err());
}

#[test]
fn other_families() {
    assert_eq!(
        build_logical("and", vec![json!({"eq": ["a", 1]}), json!({"eq": ["b", 2]})]).unwrap(),
        json!({"and": [{"eq": ["a", 1]}, {"eq": ["b", 2]}]})
    );
    assert_eq!(build_pattern("LIKE", "t", "A%").unwrap(), json!({"like": ["t", "A%"]}));
    assert_eq!(
        build_set("in", "id", vec![json!(1), json!(2)]).unwrap(),
        json!({"in": ["id", [1, 2]]})
    );
    assert_eq!(build_math("MOD", "a", 2).unwrap(), json!({"mod": ["a", 2]}));
    assert_eq!(operator_key("%"), Some((OperatorClass::Math, "mod")));
}
