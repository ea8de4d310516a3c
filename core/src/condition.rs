//! Pure predicate evaluation for rule conditions.
//!
//! RULES (compliance-critical, must hold exactly):
//!   - A condition on an absent context field is false for every
//!     operator. Absent data never satisfies a condition.
//!   - Type mismatches evaluate to false; evaluation never errors.
//!   - Unknown operators evaluate to false and are logged.

use crate::types::RuleContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    GreaterThan,
    LessThan,
    Contains,
    InList,
    Regex,
    /// Catch-all for operators this engine does not recognise, so a
    /// rule document with a bad operator still loads and evaluates
    /// false instead of failing the whole rule set.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
    #[serde(default)]
    pub description: String,
}

/// Stateless evaluator shared by the rule store and the engine.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// True iff every condition matches. An empty list always matches.
    pub fn matches_all(conditions: &[RuleCondition], ctx: &RuleContext) -> bool {
        conditions.iter().all(|c| Self::evaluate(c, ctx))
    }

    pub fn evaluate(condition: &RuleCondition, ctx: &RuleContext) -> bool {
        let actual = match ctx.get(&condition.field) {
            Some(value) => value,
            None => return false,
        };

        match condition.op {
            // Strict, type-sensitive equality.
            ConditionOp::Equals => actual == &condition.value,
            ConditionOp::GreaterThan => match (as_number(actual), as_number(&condition.value)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOp::LessThan => match (as_number(actual), as_number(&condition.value)) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOp::Contains => match (actual.as_str(), condition.value.as_str()) {
                (Some(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
            ConditionOp::InList => condition
                .value
                .as_array()
                .is_some_and(|items| items.contains(actual)),
            ConditionOp::Regex => match (actual.as_str(), condition.value.as_str()) {
                (Some(text), Some(pattern)) => match Regex::new(pattern) {
                    Ok(re) => re.is_match(text),
                    Err(err) => {
                        log::warn!(
                            "condition on '{}': invalid regex '{pattern}': {err}",
                            condition.field
                        );
                        false
                    }
                },
                _ => false,
            },
            ConditionOp::Unknown => {
                log::warn!(
                    "condition on '{}': unknown operator, evaluating false",
                    condition.field
                );
                false
            }
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}
