//! Condition evaluator semantics: these are compliance-critical and
//! must match the documented operator table exactly.

use compliance_core::condition::{ConditionEvaluator, ConditionOp, RuleCondition};
use compliance_core::types::RuleContext;
use serde_json::json;

fn cond(field: &str, op: ConditionOp, value: serde_json::Value) -> RuleCondition {
    RuleCondition {
        field: field.to_string(),
        op,
        value,
        description: String::new(),
    }
}

fn ctx() -> RuleContext {
    let mut ctx = RuleContext::new();
    ctx.set("amount", 9_500.0);
    ctx.set("currency", "USD");
    ctx.set("memo", "offshore holding transfer");
    ctx
}

/// Equality is strict and type-sensitive.
#[test]
fn equals_is_type_sensitive() {
    let ctx = ctx();
    assert!(ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::Equals, json!("USD")),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::Equals, json!("usd")),
        &ctx
    ));
    // A number never equals its string rendering.
    assert!(!ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::Equals, json!("9500")),
        &ctx
    ));
}

/// Numeric comparisons are false (never an error) on non-numeric input.
#[test]
fn numeric_comparisons() {
    let ctx = ctx();
    assert!(ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::GreaterThan, json!(9_000)),
        &ctx
    ));
    assert!(ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::LessThan, json!(10_000)),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::GreaterThan, json!(9_500.0)),
        &ctx
    ));
    // Context value is a string: comparison is false, not an error.
    assert!(!ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::GreaterThan, json!(1)),
        &ctx
    ));
    // Rule value is non-numeric.
    assert!(!ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::LessThan, json!("lots")),
        &ctx
    ));
}

#[test]
fn contains_is_substring_on_strings_only() {
    let ctx = ctx();
    assert!(ConditionEvaluator::evaluate(
        &cond("memo", ConditionOp::Contains, json!("offshore")),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("memo", ConditionOp::Contains, json!("onshore")),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::Contains, json!("9")),
        &ctx
    ));
}

#[test]
fn in_list_requires_an_array_rule_value() {
    let ctx = ctx();
    assert!(ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::InList, json!(["EUR", "USD"])),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::InList, json!(["EUR", "GBP"])),
        &ctx
    ));
    // Non-array rule value never matches.
    assert!(!ConditionEvaluator::evaluate(
        &cond("currency", ConditionOp::InList, json!("USD")),
        &ctx
    ));
}

#[test]
fn regex_matches_strings_and_swallows_bad_patterns() {
    let ctx = ctx();
    assert!(ConditionEvaluator::evaluate(
        &cond("memo", ConditionOp::Regex, json!("^offshore.*transfer$")),
        &ctx
    ));
    assert!(!ConditionEvaluator::evaluate(
        &cond("memo", ConditionOp::Regex, json!("^transfer")),
        &ctx
    ));
    // Invalid pattern: false, never a panic or error.
    assert!(!ConditionEvaluator::evaluate(
        &cond("memo", ConditionOp::Regex, json!("([unclosed")),
        &ctx
    ));
    // Non-string context value.
    assert!(!ConditionEvaluator::evaluate(
        &cond("amount", ConditionOp::Regex, json!("9.*")),
        &ctx
    ));
}

/// A missing context field fails every operator.
#[test]
fn absent_field_fails_every_operator() {
    let ctx = ctx();
    let ops = [
        ConditionOp::Equals,
        ConditionOp::GreaterThan,
        ConditionOp::LessThan,
        ConditionOp::Contains,
        ConditionOp::InList,
        ConditionOp::Regex,
    ];
    for op in ops {
        assert!(
            !ConditionEvaluator::evaluate(&cond("no_such_field", op, json!("x")), &ctx),
            "absent field matched under {op:?}"
        );
    }
}

/// Operators this engine does not recognise deserialize to Unknown and
/// evaluate false instead of failing the rule load.
#[test]
fn unknown_operator_evaluates_false() {
    let condition: RuleCondition = serde_json::from_value(json!({
        "field": "currency",
        "op": "fuzzy_match",
        "value": "USD",
    }))
    .expect("condition with unknown operator should still deserialize");
    assert_eq!(condition.op, ConditionOp::Unknown);
    assert!(!ConditionEvaluator::evaluate(&condition, &ctx()));
}

/// An empty condition list always matches.
#[test]
fn empty_condition_list_matches() {
    assert!(ConditionEvaluator::matches_all(&[], &RuleContext::new()));
}
