//! Weighted AML risk aggregation.
//!
//! Contributions are ADDITIVE: each factor adds a fixed (or capped)
//! amount and the total is clamped to [0, 100]. This is deliberately
//! not a weighted average: adding a positive factor can never lower
//! the score.
//!
//! The high-risk user factor is asymmetric on purpose: a transaction
//! screening adds 25 where a standalone user assessment adds 40. Both
//! call sites are kept distinct; see DESIGN.md.

use crate::config::ScreeningConfig;
use crate::patterns::SuspiciousPattern;
use crate::types::{Recommendation, RiskLevel, Transaction, User};
use crate::velocity::VelocityCheckResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Weights ──────────────────────────────────────────────────────────────────

const LARGE_AMOUNT_CAP: f64 = 30.0;
const HIGH_RISK_TYPE_WEIGHT: f64 = 20.0;
const TX_HIGH_RISK_USER_WEIGHT: f64 = 25.0;
const USER_HIGH_RISK_WEIGHT: f64 = 40.0;
const USER_PEP_WEIGHT: f64 = 25.0;
const USER_KYC_WEIGHT: f64 = 20.0;
const USER_COUNTRY_WEIGHT: f64 = 15.0;
const VELOCITY_BREACH_WEIGHT: f64 = 25.0;
const ANALYTICS_FLOOR: f64 = 50.0;
const ANALYTICS_SCALE: f64 = 0.5;

/// Transaction types that carry elevated laundering exposure.
pub const HIGH_RISK_TRANSACTION_TYPES: &[&str] =
    &["bridge", "yield_withdrawal", "borrowing", "mixer_interaction"];

// ── Output model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    LargeAmount,
    HighRiskType,
    HighRiskProfile,
    PoliticallyExposed,
    IncompleteKyc,
    HighRiskCountries,
    PatternMatch,
    AddressAnalytics,
    VelocityBreach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor_type: FactorType,
    pub weight: f64,
    pub value: Value,
    pub contribution: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub name: String,
    pub threshold: f64,
    pub current: f64,
    pub breached: bool,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmlCheck {
    /// Clamped to [0, 100].
    pub risk_score: f64,
    pub factors: Vec<RiskFactor>,
    pub thresholds: Vec<ThresholdCheck>,
    pub recommendation: Recommendation,
    pub provider: String,
    pub checked_at: DateTime<Utc>,
}

// ── Enrichment inputs ────────────────────────────────────────────────────────

/// A pattern score feeding the aggregator: either an internal detector
/// hit or an external ML finding. Contributes
/// `round(risk_score * confidence)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSignal {
    pub name: String,
    pub risk_score: f64,
    pub confidence: f64,
}

impl From<&SuspiciousPattern> for PatternSignal {
    fn from(pattern: &SuspiciousPattern) -> Self {
        Self {
            name: pattern.pattern_type.tag().to_string(),
            risk_score: pattern.pattern_type.contribution(),
            confidence: pattern.confidence,
        }
    }
}

/// A blockchain-analytics finding for an address involved in the
/// transaction. Findings scoring 50 or below are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsFinding {
    pub address: String,
    pub category: String,
    pub risk_score: f64,
    pub source: String,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct RiskAggregator {
    config: ScreeningConfig,
}

impl RiskAggregator {
    pub fn new(config: ScreeningConfig) -> Self {
        Self { config }
    }

    /// Score a transaction screening. All inputs are optional in
    /// spirit: empty slices and a clear velocity result simply add
    /// nothing.
    pub fn score_transaction(
        &self,
        tx: &Transaction,
        user: &User,
        velocity: &VelocityCheckResult,
        signals: &[PatternSignal],
        analytics: &[AnalyticsFinding],
    ) -> AmlCheck {
        let mut factors = Vec::new();

        let threshold = self.config.threshold_for(&tx.currency);
        if tx.amount > threshold {
            let contribution = (tx.amount / threshold * 10.0).min(LARGE_AMOUNT_CAP);
            factors.push(RiskFactor {
                factor_type: FactorType::LargeAmount,
                weight: LARGE_AMOUNT_CAP,
                value: tx.amount.into(),
                contribution,
                description: format!(
                    "Amount {:.2} {} above the {:.2} threshold",
                    tx.amount, tx.currency, threshold
                ),
            });
        }

        if HIGH_RISK_TRANSACTION_TYPES.contains(&tx.tx_type.as_str()) {
            factors.push(RiskFactor {
                factor_type: FactorType::HighRiskType,
                weight: HIGH_RISK_TYPE_WEIGHT,
                value: tx.tx_type.as_str().into(),
                contribution: HIGH_RISK_TYPE_WEIGHT,
                description: format!("High-risk transaction type '{}'", tx.tx_type),
            });
        }

        if user.risk_profile.overall_risk == RiskLevel::High {
            factors.push(RiskFactor {
                factor_type: FactorType::HighRiskProfile,
                weight: TX_HIGH_RISK_USER_WEIGHT,
                value: "high".into(),
                contribution: TX_HIGH_RISK_USER_WEIGHT,
                description: "User carries a high overall risk profile".to_string(),
            });
        }

        for signal in signals {
            let contribution = (signal.risk_score * signal.confidence).round();
            factors.push(RiskFactor {
                factor_type: FactorType::PatternMatch,
                weight: signal.risk_score,
                value: signal.confidence.into(),
                contribution,
                description: format!("Pattern '{}' matched", signal.name),
            });
        }

        for finding in analytics {
            if finding.risk_score <= ANALYTICS_FLOOR {
                continue;
            }
            let contribution = (finding.risk_score * ANALYTICS_SCALE).round();
            factors.push(RiskFactor {
                factor_type: FactorType::AddressAnalytics,
                weight: finding.risk_score,
                value: finding.address.as_str().into(),
                contribution,
                description: format!(
                    "Address {} flagged as '{}' by {}",
                    finding.address, finding.category, finding.source
                ),
            });
        }

        if velocity.limit_exceeded {
            factors.push(RiskFactor {
                factor_type: FactorType::VelocityBreach,
                weight: VELOCITY_BREACH_WEIGHT,
                value: velocity.current.into(),
                contribution: VELOCITY_BREACH_WEIGHT,
                description: format!(
                    "Velocity limit breached: {:.2} against a cap of {:.2}",
                    velocity.current, velocity.limit
                ),
            });
        }

        self.finish(factors)
    }

    /// Score a standalone user compliance assessment. Uses the
    /// user-path base weights (notably 40 for a high risk profile).
    pub fn assess_user(&self, user: &User) -> AmlCheck {
        let mut factors = Vec::new();

        if user.risk_profile.overall_risk == RiskLevel::High {
            factors.push(RiskFactor {
                factor_type: FactorType::HighRiskProfile,
                weight: USER_HIGH_RISK_WEIGHT,
                value: "high".into(),
                contribution: USER_HIGH_RISK_WEIGHT,
                description: "User carries a high overall risk profile".to_string(),
            });
        }

        if user.risk_profile.politically_exposed {
            factors.push(RiskFactor {
                factor_type: FactorType::PoliticallyExposed,
                weight: USER_PEP_WEIGHT,
                value: true.into(),
                contribution: USER_PEP_WEIGHT,
                description: "User is a politically exposed person".to_string(),
            });
        }

        if user.kyc_status.status != "approved" {
            factors.push(RiskFactor {
                factor_type: FactorType::IncompleteKyc,
                weight: USER_KYC_WEIGHT,
                value: user.kyc_status.status.as_str().into(),
                contribution: USER_KYC_WEIGHT,
                description: format!("KYC status is '{}'", user.kyc_status.status),
            });
        }

        if !user.risk_profile.high_risk_countries.is_empty() {
            factors.push(RiskFactor {
                factor_type: FactorType::HighRiskCountries,
                weight: USER_COUNTRY_WEIGHT,
                value: serde_json::to_value(&user.risk_profile.high_risk_countries)
                    .unwrap_or(Value::Null),
                contribution: USER_COUNTRY_WEIGHT,
                description: format!(
                    "Links to {} high-risk countries",
                    user.risk_profile.high_risk_countries.len()
                ),
            });
        }

        self.finish(factors)
    }

    fn finish(&self, factors: Vec<RiskFactor>) -> AmlCheck {
        let raw: f64 = factors.iter().map(|f| f.contribution).sum();
        let risk_score = raw.clamp(0.0, 100.0);

        let thresholds = vec![
            ThresholdCheck {
                name: "manual_review".to_string(),
                threshold: self.config.manual_review_threshold,
                current: risk_score,
                breached: risk_score > self.config.manual_review_threshold,
                action: "escalate_manual_review".to_string(),
            },
            ThresholdCheck {
                name: "block".to_string(),
                threshold: self.config.block_threshold,
                current: risk_score,
                breached: risk_score > self.config.block_threshold,
                action: "block_transaction".to_string(),
            },
        ];

        AmlCheck {
            risk_score,
            factors,
            thresholds,
            recommendation: self.recommendation_for(risk_score),
            provider: "internal".to_string(),
            checked_at: Utc::now(),
        }
    }

    /// Boundaries are exclusive: a score of exactly 75 still flags, a
    /// score of exactly 90 still goes to manual review.
    pub fn recommendation_for(&self, score: f64) -> Recommendation {
        if score > self.config.block_threshold {
            Recommendation::Block
        } else if score > self.config.manual_review_threshold {
            Recommendation::ManualReview
        } else if score > self.config.flag_threshold {
            Recommendation::Flag
        } else {
            Recommendation::Approve
        }
    }
}
