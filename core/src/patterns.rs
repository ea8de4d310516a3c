//! Heuristic suspicious-pattern detectors.
//!
//! Each detector returns at most one pattern per transaction:
//!   - Structuring: amount just under the currency's reporting
//!     threshold (the classic sub-$10k split).
//!   - Round numbers: large amounts divisible by 1000.
//!   - Rapid transactions: another transaction within 5 minutes.
//!   - Unusual timing: activity between 02:00 and 06:00.
//!   - Cross-border: not implemented yet; always returns none.
//!
//! Detectors are deterministic and stateless; rolling state comes in
//! via the caller-supplied `VelocityMetrics`.

use crate::config::ScreeningConfig;
use crate::types::{Severity, Transaction, User};
use crate::velocity::VelocityMetrics;
use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Amounts within this fraction below the threshold count as
/// structuring: `[threshold * 0.9, threshold)`.
const STRUCTURING_BAND: f64 = 0.9;
const ROUND_NUMBER_FLOOR: f64 = 1_000.0;
const RAPID_GAP_MINUTES: i64 = 5;
const UNUSUAL_HOUR_START: u32 = 2;
const UNUSUAL_HOUR_END: u32 = 6;

// ── Pattern model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Structuring,
    RoundNumbers,
    RapidTransactions,
    UnusualTiming,
    CrossBorder,
}

impl PatternType {
    /// Fixed contribution of this pattern to the aggregate risk score.
    pub fn contribution(&self) -> f64 {
        match self {
            PatternType::Structuring => 30.0,
            PatternType::RapidTransactions => 25.0,
            PatternType::CrossBorder => 20.0,
            PatternType::UnusualTiming => 15.0,
            PatternType::RoundNumbers => 10.0,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PatternType::Structuring => "structuring",
            PatternType::RoundNumbers => "round_numbers",
            PatternType::RapidTransactions => "rapid_transactions",
            PatternType::UnusualTiming => "unusual_timing",
            PatternType::CrossBorder => "cross_border",
        }
    }
}

/// Ephemeral detection result; produced per call, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousPattern {
    pub pattern_type: PatternType,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternScan {
    pub suspicious: bool,
    pub patterns: Vec<SuspiciousPattern>,
    pub risk_score: f64,
}

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct PatternDetector {
    currency_thresholds: BTreeMap<String, f64>,
    default_threshold: f64,
}

impl PatternDetector {
    pub fn new(config: &ScreeningConfig) -> Self {
        Self {
            currency_thresholds: config.currency_thresholds.clone(),
            default_threshold: config.default_threshold,
        }
    }

    fn threshold_for(&self, currency: &str) -> f64 {
        self.currency_thresholds
            .get(currency)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// Run every detector and aggregate. `metrics` is the user's
    /// rolling state after this transaction was recorded.
    pub fn detect(
        &self,
        tx: &Transaction,
        user: &User,
        metrics: Option<&VelocityMetrics>,
    ) -> PatternScan {
        let mut patterns = Vec::new();

        if let Some(p) = self.detect_structuring(tx) {
            patterns.push(p);
        }
        if let Some(p) = self.detect_round_numbers(tx) {
            patterns.push(p);
        }
        if let Some(p) = metrics.and_then(|m| self.detect_rapid_transactions(tx, m)) {
            patterns.push(p);
        }
        if let Some(p) = self.detect_unusual_timing(tx) {
            patterns.push(p);
        }
        if let Some(p) = self.detect_cross_border(tx, user) {
            patterns.push(p);
        }

        let risk_score: f64 = patterns
            .iter()
            .map(|p| p.pattern_type.contribution())
            .sum::<f64>()
            .min(100.0);
        let suspicious = !patterns.is_empty() && risk_score > 25.0;

        PatternScan {
            suspicious,
            patterns,
            risk_score,
        }
    }

    /// Fires iff `threshold * 0.9 <= amount < threshold`, never at or
    /// above the threshold itself (that is plain reporting territory).
    fn detect_structuring(&self, tx: &Transaction) -> Option<SuspiciousPattern> {
        let threshold = self.threshold_for(&tx.currency);
        let lower = threshold * STRUCTURING_BAND;
        if tx.amount < lower || tx.amount >= threshold {
            return None;
        }
        Some(SuspiciousPattern {
            pattern_type: PatternType::Structuring,
            description: format!(
                "Amount {:.2} {} sits just below the {:.2} reporting threshold",
                tx.amount, tx.currency, threshold
            ),
            severity: Severity::High,
            confidence: 0.8,
            metadata: BTreeMap::from([
                ("threshold".to_string(), threshold.into()),
                ("margin".to_string(), (threshold - tx.amount).into()),
            ]),
        })
    }

    fn detect_round_numbers(&self, tx: &Transaction) -> Option<SuspiciousPattern> {
        if tx.amount < ROUND_NUMBER_FLOOR || tx.amount % 1_000.0 != 0.0 {
            return None;
        }
        let roundness = trailing_zeros(tx.amount as u64);
        Some(SuspiciousPattern {
            pattern_type: PatternType::RoundNumbers,
            description: format!("Round amount {:.0} {}", tx.amount, tx.currency),
            severity: Severity::Low,
            confidence: 0.6,
            metadata: BTreeMap::from([("roundness".to_string(), roundness.into())]),
        })
    }

    /// Fires when the gap since the user's previous transaction is
    /// under 5 minutes and this is not the first transaction today.
    fn detect_rapid_transactions(
        &self,
        tx: &Transaction,
        metrics: &VelocityMetrics,
    ) -> Option<SuspiciousPattern> {
        let previous = metrics.previous_transaction_at?;
        let gap = tx.timestamp.signed_duration_since(previous);
        if gap >= Duration::minutes(RAPID_GAP_MINUTES) || metrics.daily_count <= 1 {
            return None;
        }
        Some(SuspiciousPattern {
            pattern_type: PatternType::RapidTransactions,
            description: format!(
                "Transaction {} seconds after the previous one",
                gap.num_seconds()
            ),
            severity: Severity::Medium,
            confidence: 0.7,
            metadata: BTreeMap::from([
                ("gap_seconds".to_string(), gap.num_seconds().into()),
                ("daily_count".to_string(), metrics.daily_count.into()),
            ]),
        })
    }

    fn detect_unusual_timing(&self, tx: &Transaction) -> Option<SuspiciousPattern> {
        let hour = tx.timestamp.hour();
        if !(UNUSUAL_HOUR_START..=UNUSUAL_HOUR_END).contains(&hour) {
            return None;
        }
        Some(SuspiciousPattern {
            pattern_type: PatternType::UnusualTiming,
            description: format!("Transaction at {hour:02}:00, outside normal activity hours"),
            severity: Severity::Low,
            confidence: 0.5,
            metadata: BTreeMap::from([("hour".to_string(), hour.into())]),
        })
    }

    /// Cross-border detection needs counterparty jurisdiction data the
    /// transaction feed does not carry yet, so this never fires.
    /// TODO: wire counterparty jurisdiction resolution in and compare
    /// against `user.jurisdiction` / `risk_profile.high_risk_countries`.
    fn detect_cross_border(&self, _tx: &Transaction, _user: &User) -> Option<SuspiciousPattern> {
        None
    }
}

/// Count of trailing zero digits, e.g. 50_000 -> 4.
fn trailing_zeros(mut n: u64) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut zeros = 0;
    while n % 10 == 0 {
        zeros += 1;
        n /= 10;
    }
    zeros
}
