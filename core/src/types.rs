//! Shared data model for the screening core.
//!
//! Everything the engine consumes or produces lives here: the
//! transaction and user inputs, the typed rule context, and the
//! violation record. Component-specific result types stay with their
//! components (velocity.rs, patterns.rs, risk.rs).

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stable identifier for a user.
pub type UserId = String;

/// Stable identifier for a compliance rule.
pub type RuleId = String;

// ── Enums ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// The final recommendation attached to an AML check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Flag,
    ManualReview,
    Block,
}

/// Rule scope. Jurisdiction indices use the jurisdiction code directly;
/// categories are closed and typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Kyc,
    Aml,
    Reporting,
    Sanctions,
    Licensing,
}

/// Violation lifecycle status. The core only ever creates `Open`
/// violations; status transitions happen in the surrounding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    UnderInvestigation,
    Resolved,
    Dismissed,
}

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub tx_type: String,
    pub timestamp: DateTime<Utc>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub overall_risk: RiskLevel,
    pub high_risk_countries: Vec<String>,
    pub politically_exposed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycStatus {
    pub level: u8,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub jurisdiction: String,
    pub activity_level: String,
    pub risk_profile: RiskProfile,
    pub kyc_status: KycStatus,
}

// ── Rule context ─────────────────────────────────────────────────────────────

/// Typed context for rule condition matching.
///
/// Conditions depend on exact field presence/absence semantics, so the
/// context is an explicit field map rather than an open-ended object:
/// an absent field returns `None` and fails every operator. The
/// canonical constructors populate the defined fields; callers may add
/// extra fields with [`RuleContext::set`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleContext {
    fields: BTreeMap<String, Value>,
}

impl RuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical context for screening a transaction by a user.
    pub fn for_transaction(tx: &Transaction, user: &User) -> Self {
        let mut ctx = Self::for_user(user);
        ctx.set("amount", tx.amount);
        ctx.set("currency", tx.currency.as_str());
        ctx.set("transaction_type", tx.tx_type.as_str());
        ctx.set("hour", tx.timestamp.hour());
        if let Some(from) = &tx.from_address {
            ctx.set("from_address", from.as_str());
        }
        if let Some(to) = &tx.to_address {
            ctx.set("to_address", to.as_str());
        }
        ctx
    }

    /// Canonical context for a user compliance assessment.
    pub fn for_user(user: &User) -> Self {
        let mut ctx = Self::new();
        ctx.set("user_id", user.id.as_str());
        ctx.set("jurisdiction", user.jurisdiction.as_str());
        ctx.set("activity_level", user.activity_level.as_str());
        ctx.set(
            "overall_risk",
            serde_json::to_value(user.risk_profile.overall_risk).unwrap_or(Value::Null),
        );
        ctx.set("politically_exposed", user.risk_profile.politically_exposed);
        ctx.set("kyc_level", user.kyc_status.level);
        ctx.set("kyc_status", user.kyc_status.status.as_str());
        ctx
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ── Violations ───────────────────────────────────────────────────────────────

/// A detected compliance violation. Immutable once created; status
/// changes are external to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub id: String,
    pub rule_id: RuleId,
    pub entity_type: String,
    pub entity_id: String,
    pub jurisdiction: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub description: String,
    pub details: BTreeMap<String, Value>,
    pub detected_at: DateTime<Utc>,
    pub status: ViolationStatus,
    pub escalated: bool,
}
