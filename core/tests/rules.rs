//! Rule store behaviour: indexing, lifecycle, seeding.

use chrono::Utc;
use compliance_core::condition::{ConditionOp, RuleCondition};
use compliance_core::config::{
    JurisdictionProfile, KycRequirement, RequirementConfig,
};
use compliance_core::error::EngineError;
use compliance_core::rule_store::{ComplianceRule, RulePatch, RuleStore};
use compliance_core::types::{RuleCategory, RuleContext, Severity};
use serde_json::json;
use std::collections::BTreeMap;

fn rule(id: &str, jurisdiction: &str, category: RuleCategory) -> ComplianceRule {
    let now = Utc::now();
    ComplianceRule {
        id: id.to_string(),
        jurisdiction: jurisdiction.to_string(),
        category,
        severity: Severity::Medium,
        conditions: Vec::new(),
        actions: Vec::new(),
        effective_at: now,
        last_updated: now,
        source: "test".to_string(),
        version: 1,
    }
}

fn profile(code: &str) -> JurisdictionProfile {
    JurisdictionProfile {
        code: code.to_string(),
        name: code.to_string(),
        reporting_thresholds: BTreeMap::from([("USD".to_string(), 10_000.0)]),
        requirements: vec![RequirementConfig {
            name: "sanctions screening".to_string(),
            category: RuleCategory::Sanctions,
            severity: Severity::Critical,
            conditions: vec![RuleCondition {
                field: "sanctions_hit".to_string(),
                op: ConditionOp::Equals,
                value: json!(true),
                description: String::new(),
            }],
            description: "Counterparty matched a sanctions list".to_string(),
        }],
        kyc: Some(KycRequirement {
            min_level: 2,
            required_status: "approved".to_string(),
        }),
    }
}

/// Applicable rules come from the intersection of the jurisdiction and
/// category indices.
#[test]
fn applicable_rules_intersects_indices() {
    let store = RuleStore::new();
    store.add_rule(rule("us-aml", "US", RuleCategory::Aml));
    store.add_rule(rule("us-kyc", "US", RuleCategory::Kyc));
    store.add_rule(rule("de-aml", "DE", RuleCategory::Aml));

    let ctx = RuleContext::new();
    let matched = store.applicable_rules("US", RuleCategory::Aml, &ctx);
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, "us-aml");

    assert!(store.applicable_rules("FR", RuleCategory::Aml, &ctx).is_empty());
    assert!(store
        .applicable_rules("US", RuleCategory::Reporting, &ctx)
        .is_empty());
}

/// Repeated queries against an unchanged store return the same set.
#[test]
fn applicable_rules_is_idempotent() {
    let store = RuleStore::new();
    store.add_rule(rule("a", "US", RuleCategory::Aml));
    store.add_rule(rule("b", "US", RuleCategory::Aml));

    let ctx = RuleContext::new();
    let first: Vec<String> = store
        .applicable_rules("US", RuleCategory::Aml, &ctx)
        .into_iter()
        .map(|r| r.id)
        .collect();
    let second: Vec<String> = store
        .applicable_rules("US", RuleCategory::Aml, &ctx)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(first, second);
    assert_eq!(first, vec!["a".to_string(), "b".to_string()]);
}

/// Rules with non-matching conditions are filtered out.
#[test]
fn conditions_filter_applicable_rules() {
    let store = RuleStore::new();
    let mut large_only = rule("large", "US", RuleCategory::Reporting);
    large_only.conditions = vec![RuleCondition {
        field: "amount".to_string(),
        op: ConditionOp::GreaterThan,
        value: json!(10_000),
        description: String::new(),
    }];
    store.add_rule(large_only);

    let mut small = RuleContext::new();
    small.set("amount", 500.0);
    assert!(store
        .applicable_rules("US", RuleCategory::Reporting, &small)
        .is_empty());

    let mut large = RuleContext::new();
    large.set("amount", 50_000.0);
    assert_eq!(
        store
            .applicable_rules("US", RuleCategory::Reporting, &large)
            .len(),
        1
    );
}

#[test]
fn update_bumps_version_and_last_updated() {
    let store = RuleStore::new();
    store.add_rule(rule("r1", "US", RuleCategory::Aml));
    let before = store.get_rule("r1").unwrap();

    let updated = store
        .update_rule(
            "r1",
            RulePatch {
                severity: Some(Severity::Critical),
                ..RulePatch::default()
            },
        )
        .unwrap();

    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(updated.version, before.version + 1);
    assert!(updated.last_updated >= before.last_updated);
}

#[test]
fn update_unknown_rule_fails() {
    let store = RuleStore::new();
    let err = store.update_rule("ghost", RulePatch::default()).unwrap_err();
    assert!(matches!(err, EngineError::RuleNotFound { .. }));
}

/// Removing a non-existent rule fails with RuleNotFound and leaves the
/// existing indices untouched.
#[test]
fn remove_unknown_rule_leaves_indices_unchanged() {
    let store = RuleStore::new();
    store.add_rule(rule("keep", "US", RuleCategory::Aml));

    let ctx = RuleContext::new();
    let before: Vec<String> = store
        .applicable_rules("US", RuleCategory::Aml, &ctx)
        .into_iter()
        .map(|r| r.id)
        .collect();

    let err = store.remove_rule("ghost").unwrap_err();
    assert!(matches!(err, EngineError::RuleNotFound { .. }));

    let after: Vec<String> = store
        .applicable_rules("US", RuleCategory::Aml, &ctx)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(before, after);
    assert_eq!(store.rule_count(), 1);
}

#[test]
fn remove_existing_rule_drops_it_from_the_index() {
    let store = RuleStore::new();
    store.add_rule(rule("gone", "US", RuleCategory::Aml));
    store.remove_rule("gone").unwrap();
    assert_eq!(store.rule_count(), 0);
    assert!(store
        .applicable_rules("US", RuleCategory::Aml, &RuleContext::new())
        .is_empty());
}

/// Seeding creates one rule per threshold, requirement and KYC entry.
#[test]
fn seeding_creates_one_rule_per_entry() {
    let store = RuleStore::new();
    let count = store.seed_from_jurisdictions(&[profile("US")]).unwrap();
    assert_eq!(count, 3);
    assert_eq!(store.rule_count(), 3);

    // The reporting rule matches a large USD transaction.
    let mut ctx = RuleContext::new();
    ctx.set("currency", "USD");
    ctx.set("amount", 15_000.0);
    let matched = store.applicable_rules("US", RuleCategory::Reporting, &ctx);
    assert_eq!(matched.len(), 1, "reporting rule should match");

    // ...but not one at the threshold.
    let mut at_threshold = RuleContext::new();
    at_threshold.set("currency", "USD");
    at_threshold.set("amount", 10_000.0);
    assert!(store
        .applicable_rules("US", RuleCategory::Reporting, &at_threshold)
        .is_empty());

    // The KYC rule matches a level-1 user.
    let mut kyc_ctx = RuleContext::new();
    kyc_ctx.set("kyc_level", 1);
    assert_eq!(
        store.applicable_rules("US", RuleCategory::Kyc, &kyc_ctx).len(),
        1
    );
}

/// A non-positive reporting threshold aborts seeding.
#[test]
fn seeding_rejects_non_positive_thresholds() {
    let store = RuleStore::new();
    let mut bad = profile("US");
    bad.reporting_thresholds
        .insert("EUR".to_string(), -5.0);
    let err = store.seed_from_jurisdictions(&[bad]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidThreshold { .. }));
}
