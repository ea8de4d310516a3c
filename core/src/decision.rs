//! Final approve/flag policy.
//!
//! A total, order-independent function of its inputs: the same
//! violations, AML check and flag severities always produce the same
//! decision, whatever order they arrive in. Auditors replay decisions
//! from stored inputs, so nothing here may read ambient state.

use crate::risk::AmlCheck;
use crate::types::{ComplianceViolation, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Approved,
    Flagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub status: ComplianceStatus,
    pub approved: bool,
    pub reasons: Vec<String>,
}

pub struct DecisionPolicy {
    high_risk_score: f64,
}

impl DecisionPolicy {
    pub fn new(high_risk_score: f64) -> Self {
        Self { high_risk_score }
    }

    /// Approved iff there are zero violations, the risk score is below
    /// the high threshold, and no flag carries critical severity.
    pub fn decide(
        &self,
        violations: &[ComplianceViolation],
        aml: &AmlCheck,
        flag_severities: &[Severity],
    ) -> Decision {
        let mut reasons = Vec::new();

        if !violations.is_empty() {
            reasons.push(format!("{} compliance violation(s)", violations.len()));
        }
        if aml.risk_score >= self.high_risk_score {
            reasons.push(format!(
                "risk score {:.2} at or above the high threshold {:.2}",
                aml.risk_score, self.high_risk_score
            ));
        }
        if flag_severities.contains(&Severity::Critical) {
            reasons.push("critical-severity flag present".to_string());
        }

        if reasons.is_empty() {
            Decision {
                status: ComplianceStatus::Approved,
                approved: true,
                reasons,
            }
        } else {
            Decision {
                status: ComplianceStatus::Flagged,
                approved: false,
                reasons,
            }
        }
    }
}
