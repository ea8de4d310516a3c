//! Screening configuration and jurisdiction profiles.
//!
//! Jurisdiction profiles come from the external JurisdictionManager and
//! are consumed once at startup to seed the rule store. ScreeningConfig
//! carries the tunable thresholds the runtime components share.

use crate::condition::RuleCondition;
use crate::error::{EngineError, EngineResult};
use crate::types::{RuleCategory, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default per-currency reporting threshold when a currency has no
/// explicit entry ($10k, the FinCEN CTR line).
pub const DEFAULT_REPORTING_THRESHOLD: f64 = 10_000.0;

// ── Jurisdiction profiles ────────────────────────────────────────────────────

/// One compliance requirement inside a jurisdiction profile. Seeds a
/// single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementConfig {
    pub name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub description: String,
}

/// Minimum KYC expectations for a jurisdiction. Seeds a single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRequirement {
    pub min_level: u8,
    pub required_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionProfile {
    pub code: String,
    pub name: String,
    /// Reporting thresholds per currency. Must be positive; a
    /// non-positive entry aborts seeding with `InvalidThreshold`.
    #[serde(default)]
    pub reporting_thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub requirements: Vec<RequirementConfig>,
    #[serde(default)]
    pub kyc: Option<KycRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
struct JurisdictionFile {
    jurisdictions: Vec<JurisdictionProfile>,
}

/// Parse jurisdiction profiles from a JSON document.
pub fn load_jurisdictions_str(content: &str) -> EngineResult<Vec<JurisdictionProfile>> {
    let file: JurisdictionFile = serde_json::from_str(content)?;
    Ok(file.jurisdictions)
}

/// Load jurisdiction profiles from a JSON file on disk.
pub fn load_jurisdictions(path: &str) -> EngineResult<Vec<JurisdictionProfile>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("Cannot read {path}: {e}")))?;
    load_jurisdictions_str(&content)
}

// ── Runtime thresholds ───────────────────────────────────────────────────────

/// Per-user rolling-window caps. Each cap is checked independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityLimits {
    pub daily_count: u32,
    pub daily_volume: f64,
    pub weekly_volume: f64,
    pub monthly_volume: f64,
}

impl Default for VelocityLimits {
    fn default() -> Self {
        Self {
            daily_count: 20,
            daily_volume: 25_000.0,
            weekly_volume: 100_000.0,
            monthly_volume: 300_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// Reporting thresholds per currency, used by structuring and
    /// large-amount detection. Currencies without an entry fall back
    /// to `default_threshold`.
    #[serde(default)]
    pub currency_thresholds: BTreeMap<String, f64>,
    pub default_threshold: f64,
    #[serde(default)]
    pub velocity_limits: VelocityLimits,
    /// Score must exceed (not equal) these to breach.
    pub manual_review_threshold: f64,
    pub block_threshold: f64,
    pub flag_threshold: f64,
    /// Decision policy: a transaction with a score at or above this is
    /// never approved regardless of violations.
    pub high_risk_score: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        let mut currency_thresholds = BTreeMap::new();
        currency_thresholds.insert("USD".to_string(), 10_000.0);
        currency_thresholds.insert("EUR".to_string(), 10_000.0);
        currency_thresholds.insert("GBP".to_string(), 10_000.0);
        Self {
            currency_thresholds,
            default_threshold: DEFAULT_REPORTING_THRESHOLD,
            velocity_limits: VelocityLimits::default(),
            manual_review_threshold: 75.0,
            block_threshold: 90.0,
            flag_threshold: 50.0,
            high_risk_score: 75.0,
        }
    }
}

impl ScreeningConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(content: &str) -> EngineResult<Self> {
        let config: ScreeningConfig = serde_json::from_str(content)?;
        if config.manual_review_threshold >= config.block_threshold {
            return Err(EngineError::Config(format!(
                "manual_review_threshold {} must be below block_threshold {}",
                config.manual_review_threshold, config.block_threshold
            )));
        }
        Ok(config)
    }

    pub fn threshold_for(&self, currency: &str) -> f64 {
        self.currency_thresholds
            .get(currency)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}
