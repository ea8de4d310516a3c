//! Rule ownership and jurisdiction/category indexing.
//!
//! RULES:
//!   - The store exclusively owns every `ComplianceRule`; callers get
//!     clones, never references into the store.
//!   - Mutations rebuild the index into a fresh structure and swap it
//!     under the write lock, so readers never observe a partially
//!     rebuilt index. A rule takes effect on the next index read.
//!   - Single writer, many readers; reads are lock-held only long
//!     enough to clone the matching rules out.

use crate::condition::{ConditionEvaluator, RuleCondition};
use crate::config::JurisdictionProfile;
use crate::error::{EngineError, EngineResult};
use crate::types::{RuleCategory, RuleContext, RuleId, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ── Rule model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Flag,
    RequireReview,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    pub action: ActionType,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub id: RuleId,
    pub jurisdiction: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub effective_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub source: String,
    pub version: u32,
}

/// Partial update applied by `update_rule`. Unset fields keep their
/// current value; any update bumps `version` and `last_updated`.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub severity: Option<Severity>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
    pub source: Option<String>,
}

// ── Index ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RuleIndex {
    by_jurisdiction: HashMap<String, HashSet<RuleId>>,
    by_category: HashMap<RuleCategory, HashSet<RuleId>>,
}

impl RuleIndex {
    fn build(rules: &HashMap<RuleId, ComplianceRule>) -> Self {
        let mut index = RuleIndex::default();
        for rule in rules.values() {
            index
                .by_jurisdiction
                .entry(rule.jurisdiction.clone())
                .or_default()
                .insert(rule.id.clone());
            index
                .by_category
                .entry(rule.category)
                .or_default()
                .insert(rule.id.clone());
        }
        index
    }
}

struct StoreInner {
    rules: HashMap<RuleId, ComplianceRule>,
    index: Arc<RuleIndex>,
}

// ── Store ────────────────────────────────────────────────────────────────────

pub struct RuleStore {
    inner: RwLock<StoreInner>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                rules: HashMap::new(),
                index: Arc::new(RuleIndex::default()),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn rule_count(&self) -> usize {
        self.read().rules.len()
    }

    pub fn get_rule(&self, id: &str) -> Option<ComplianceRule> {
        self.read().rules.get(id).cloned()
    }

    /// Insert or replace a rule and rebuild the index.
    pub fn add_rule(&self, rule: ComplianceRule) {
        let mut inner = self.write();
        inner.rules.insert(rule.id.clone(), rule);
        inner.index = Arc::new(RuleIndex::build(&inner.rules));
    }

    /// Apply a patch to an existing rule. Fails with `RuleNotFound` if
    /// the id is absent; the index is untouched in that case.
    pub fn update_rule(&self, id: &str, patch: RulePatch) -> EngineResult<ComplianceRule> {
        let mut inner = self.write();
        let rule = inner
            .rules
            .get_mut(id)
            .ok_or_else(|| EngineError::RuleNotFound { id: id.to_string() })?;

        if let Some(severity) = patch.severity {
            rule.severity = severity;
        }
        if let Some(conditions) = patch.conditions {
            rule.conditions = conditions;
        }
        if let Some(actions) = patch.actions {
            rule.actions = actions;
        }
        if let Some(source) = patch.source {
            rule.source = source;
        }
        rule.version += 1;
        rule.last_updated = Utc::now();
        let updated = rule.clone();

        inner.index = Arc::new(RuleIndex::build(&inner.rules));
        Ok(updated)
    }

    /// Remove a rule. Fails with `RuleNotFound` if the id is absent;
    /// existing indices are left unchanged on failure.
    pub fn remove_rule(&self, id: &str) -> EngineResult<ComplianceRule> {
        let mut inner = self.write();
        let removed = inner
            .rules
            .remove(id)
            .ok_or_else(|| EngineError::RuleNotFound { id: id.to_string() })?;
        inner.index = Arc::new(RuleIndex::build(&inner.rules));
        Ok(removed)
    }

    /// Rules scoped to both the jurisdiction and the category whose
    /// conditions all match the context. Idempotent for an unchanged
    /// rule set; results are ordered by rule id for stable audit logs.
    pub fn applicable_rules(
        &self,
        jurisdiction: &str,
        category: RuleCategory,
        ctx: &RuleContext,
    ) -> Vec<ComplianceRule> {
        let inner = self.read();
        let Some(in_jurisdiction) = inner.index.by_jurisdiction.get(jurisdiction) else {
            return Vec::new();
        };
        let Some(in_category) = inner.index.by_category.get(&category) else {
            return Vec::new();
        };

        let mut matched: Vec<ComplianceRule> = in_jurisdiction
            .intersection(in_category)
            .filter_map(|id| inner.rules.get(id))
            .filter(|rule| ConditionEvaluator::matches_all(&rule.conditions, ctx))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    // ── Seeding ──────────────────────────────────────────────────────────────

    /// Seed rules from jurisdiction profiles: one rule per reporting
    /// threshold, requirement and KYC entry. Returns the number of
    /// rules created. A non-positive threshold is fatal.
    pub fn seed_from_jurisdictions(
        &self,
        profiles: &[JurisdictionProfile],
    ) -> EngineResult<usize> {
        let now = Utc::now();
        let mut seeded = Vec::new();

        for profile in profiles {
            for (currency, threshold) in &profile.reporting_thresholds {
                if *threshold <= 0.0 {
                    return Err(EngineError::InvalidThreshold {
                        jurisdiction: profile.code.clone(),
                        name: format!("reporting_threshold.{currency}"),
                        value: *threshold,
                    });
                }
                seeded.push(reporting_rule(profile, currency, *threshold, now));
            }

            for requirement in &profile.requirements {
                seeded.push(requirement_rule(profile, requirement, now));
            }

            if let Some(kyc) = &profile.kyc {
                seeded.push(kyc_rule(profile, kyc, now));
            }
        }

        let count = seeded.len();
        let mut inner = self.write();
        for rule in seeded {
            inner.rules.insert(rule.id.clone(), rule);
        }
        inner.index = Arc::new(RuleIndex::build(&inner.rules));
        log::info!("seeded {count} rules from {} jurisdictions", profiles.len());
        Ok(count)
    }
}

fn reporting_rule(
    profile: &JurisdictionProfile,
    currency: &str,
    threshold: f64,
    now: DateTime<Utc>,
) -> ComplianceRule {
    ComplianceRule {
        id: format!("rep-{}-{}", profile.code.to_lowercase(), currency.to_lowercase()),
        jurisdiction: profile.code.clone(),
        category: RuleCategory::Reporting,
        severity: Severity::High,
        conditions: vec![
            RuleCondition {
                field: "currency".to_string(),
                op: crate::condition::ConditionOp::Equals,
                value: Value::String(currency.to_string()),
                description: format!("currency is {currency}"),
            },
            RuleCondition {
                field: "amount".to_string(),
                op: crate::condition::ConditionOp::GreaterThan,
                value: threshold.into(),
                description: format!("amount above {threshold} {currency}"),
            },
        ],
        actions: vec![RuleAction {
            action: ActionType::Report,
            params: BTreeMap::from([("threshold".to_string(), threshold.into())]),
            description: format!(
                "Transaction above the {currency} reporting threshold in {}",
                profile.code
            ),
        }],
        effective_at: now,
        last_updated: now,
        source: "jurisdiction_config".to_string(),
        version: 1,
    }
}

fn requirement_rule(
    profile: &JurisdictionProfile,
    requirement: &crate::config::RequirementConfig,
    now: DateTime<Utc>,
) -> ComplianceRule {
    ComplianceRule {
        id: format!(
            "req-{}-{}",
            profile.code.to_lowercase(),
            requirement.name.to_lowercase().replace(' ', "-")
        ),
        jurisdiction: profile.code.clone(),
        category: requirement.category,
        severity: requirement.severity,
        conditions: requirement.conditions.clone(),
        actions: vec![RuleAction {
            action: ActionType::Flag,
            params: BTreeMap::new(),
            description: requirement.description.clone(),
        }],
        effective_at: now,
        last_updated: now,
        source: "jurisdiction_config".to_string(),
        version: 1,
    }
}

fn kyc_rule(
    profile: &JurisdictionProfile,
    kyc: &crate::config::KycRequirement,
    now: DateTime<Utc>,
) -> ComplianceRule {
    ComplianceRule {
        id: format!("kyc-{}", profile.code.to_lowercase()),
        jurisdiction: profile.code.clone(),
        category: RuleCategory::Kyc,
        severity: Severity::High,
        conditions: vec![RuleCondition {
            field: "kyc_level".to_string(),
            op: crate::condition::ConditionOp::LessThan,
            value: kyc.min_level.into(),
            description: format!("KYC level below {}", kyc.min_level),
        }],
        actions: vec![RuleAction {
            action: ActionType::RequireReview,
            params: BTreeMap::from([(
                "required_status".to_string(),
                Value::String(kyc.required_status.clone()),
            )]),
            description: format!(
                "KYC below the level {} minimum for {}",
                kyc.min_level, profile.code
            ),
        }],
        effective_at: now,
        last_updated: now,
        source: "jurisdiction_config".to_string(),
        version: 1,
    }
}
