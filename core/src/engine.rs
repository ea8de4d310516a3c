//! The compliance decision engine, the only component callers see.
//!
//! EVALUATION ORDER (fixed, documented):
//!   1. Rule evaluation (reporting, AML, sanctions categories) against
//!      the typed context → violations.
//!   2. Velocity update + limit check for the user.
//!   3. Pattern detection over the transaction and rolling state.
//!   4. Optional enrichment (ML patterns, address analytics); failures
//!      degrade gracefully.
//!   5. Risk aggregation → AML check.
//!   6. Decision policy → final approve/flag.
//!   7. Audit write (fire-and-forget) and alerting.
//!
//! FAIL-CLOSED: any internal error or panic during evaluation yields a
//! maximum-risk, not-approved outcome (score 100, recommendation
//! block). The engine never silently approves on failure.

use crate::config::ScreeningConfig;
use crate::decision::{ComplianceStatus, Decision, DecisionPolicy};
use crate::error::EngineResult;
use crate::patterns::{PatternDetector, PatternScan};
use crate::risk::{AmlCheck, AnalyticsFinding, PatternSignal, RiskAggregator};
use crate::rule_store::RuleStore;
use crate::types::{
    ComplianceViolation, Recommendation, RuleCategory, RuleContext, Severity, Transaction, User,
    ViolationStatus,
};
use crate::velocity::{VelocityCheckResult, VelocityTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;
use uuid::Uuid;

// ── Collaborator interfaces ──────────────────────────────────────────────────

/// Optional ML enrichment. Absence or failure must not fail scoring.
pub trait MlPatternProvider: Send + Sync {
    fn analyze_transaction(&self, tx: &Transaction, user: &User)
        -> anyhow::Result<Vec<PatternSignal>>;
}

/// Optional blockchain-analytics enrichment; same degrade-gracefully
/// contract as the ML provider.
pub trait AddressAnalytics: Send + Sync {
    fn analyze_address(&self, address: &str, tx: &Transaction)
        -> anyhow::Result<Vec<AnalyticsFinding>>;
}

/// Fire-and-forget audit writes. A failed write is logged and ignored;
/// the screening result is returned regardless.
pub trait AuditSink: Send + Sync {
    fn record_action(&self, entry: &AuditEntry) -> anyhow::Result<String>;
}

/// Invoked by the orchestrator when a screening does not come back
/// clean. Alert delivery and escalation live outside this core.
pub trait AlertSink: Send + Sync {
    fn trigger_alert(&self, alert: &ComplianceAlert);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAlert {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub entity_id: String,
    pub recommendation: Recommendation,
}

// ── Outcomes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub transaction_id: String,
    pub user_id: String,
    pub violations: Vec<ComplianceViolation>,
    pub velocity: VelocityCheckResult,
    pub patterns: PatternScan,
    pub aml: AmlCheck,
    pub decision: Decision,
    pub screened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAssessment {
    pub user_id: String,
    pub violations: Vec<ComplianceViolation>,
    pub aml: AmlCheck,
    pub decision: Decision,
    pub assessed_at: DateTime<Utc>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct ComplianceDecisionEngine {
    config: ScreeningConfig,
    rules: Arc<RuleStore>,
    velocity: Arc<VelocityTracker>,
    detector: PatternDetector,
    aggregator: RiskAggregator,
    policy: DecisionPolicy,
    ml: Option<Arc<dyn MlPatternProvider>>,
    analytics: Option<Arc<dyn AddressAnalytics>>,
    audit: Option<Arc<dyn AuditSink>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl ComplianceDecisionEngine {
    /// Wire an engine from explicit components. No globals: every
    /// collaborator is injected, optional ones via the `with_*`
    /// builders.
    pub fn new(
        config: ScreeningConfig,
        rules: Arc<RuleStore>,
        velocity: Arc<VelocityTracker>,
    ) -> Self {
        let detector = PatternDetector::new(&config);
        let aggregator = RiskAggregator::new(config.clone());
        let policy = DecisionPolicy::new(config.high_risk_score);
        Self {
            config,
            rules,
            velocity,
            detector,
            aggregator,
            policy,
            ml: None,
            analytics: None,
            audit: None,
            alerts: None,
        }
    }

    pub fn with_ml_provider(mut self, provider: Arc<dyn MlPatternProvider>) -> Self {
        self.ml = Some(provider);
        self
    }

    pub fn with_address_analytics(mut self, analytics: Arc<dyn AddressAnalytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn velocity(&self) -> &Arc<VelocityTracker> {
        &self.velocity
    }

    /// Start the background velocity eviction thread. The returned
    /// task stops on `stop()` or when dropped at shutdown.
    pub fn start_cleanup(&self, interval: StdDuration) -> CleanupTask {
        CleanupTask::spawn(Arc::clone(&self.velocity), interval)
    }

    // ── Screening ────────────────────────────────────────────────────────────

    /// Screen a transaction. Never fails open: internal errors and
    /// panics produce a blocked, maximum-risk outcome.
    pub fn screen_transaction(
        &self,
        tx: &Transaction,
        user: &User,
        ctx: Option<RuleContext>,
    ) -> ScreeningOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| self.evaluate_transaction(tx, user, ctx)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                log::error!("screening of {} failed, failing closed: {err}", tx.id);
                self.fail_closed_transaction(tx, user)
            }
            Err(_) => {
                log::error!("panic while screening {}, failing closed", tx.id);
                self.fail_closed_transaction(tx, user)
            }
        };
        self.audit_screening(&outcome);
        self.alert_screening(&outcome);
        outcome
    }

    fn evaluate_transaction(
        &self,
        tx: &Transaction,
        user: &User,
        ctx: Option<RuleContext>,
    ) -> EngineResult<ScreeningOutcome> {
        let ctx = ctx.unwrap_or_else(|| RuleContext::for_transaction(tx, user));

        let mut violations = Vec::new();
        for category in [
            RuleCategory::Reporting,
            RuleCategory::Aml,
            RuleCategory::Sanctions,
        ] {
            for rule in self
                .rules
                .applicable_rules(&user.jurisdiction, category, &ctx)
            {
                violations.push(violation_from_rule(&rule, "transaction", &tx.id));
            }
        }

        let metrics = self.velocity.record(&user.id, tx);
        let velocity = self
            .velocity
            .check_limits(&user.id, &self.config.velocity_limits);

        let patterns = self.detector.detect(tx, user, Some(&metrics));
        for pattern in &patterns.patterns {
            self.velocity.note_pattern(&user.id, pattern.pattern_type.tag());
        }

        let mut signals: Vec<PatternSignal> =
            patterns.patterns.iter().map(PatternSignal::from).collect();
        if let Some(ml) = &self.ml {
            match ml.analyze_transaction(tx, user) {
                Ok(mut external) => signals.append(&mut external),
                Err(err) => log::warn!("ml enrichment unavailable for {}: {err}", tx.id),
            }
        }

        let mut findings = Vec::new();
        if let Some(analytics) = &self.analytics {
            for address in [tx.from_address.as_deref(), tx.to_address.as_deref()]
                .into_iter()
                .flatten()
            {
                match analytics.analyze_address(address, tx) {
                    Ok(mut found) => findings.append(&mut found),
                    Err(err) => {
                        log::warn!("address analytics unavailable for {address}: {err}")
                    }
                }
            }
        }

        let aml = self
            .aggregator
            .score_transaction(tx, user, &velocity, &signals, &findings);

        let flag_severities: Vec<Severity> = velocity
            .flags
            .iter()
            .map(|f| f.severity)
            .chain(patterns.patterns.iter().map(|p| p.severity))
            .collect();
        let decision = self.policy.decide(&violations, &aml, &flag_severities);

        Ok(ScreeningOutcome {
            transaction_id: tx.id.clone(),
            user_id: user.id.clone(),
            violations,
            velocity,
            patterns,
            aml,
            decision,
            screened_at: Utc::now(),
        })
    }

    /// Assess a user profile against KYC/AML rules and the user-path
    /// risk weights. Fail-closed like transaction screening.
    pub fn assess_user(&self, user: &User, ctx: Option<RuleContext>) -> UserAssessment {
        let result = catch_unwind(AssertUnwindSafe(|| self.evaluate_user(user, ctx)));
        match result {
            Ok(assessment) => assessment,
            Err(_) => {
                log::error!("panic while assessing user {}, failing closed", user.id);
                self.fail_closed_user(user)
            }
        }
    }

    fn evaluate_user(&self, user: &User, ctx: Option<RuleContext>) -> UserAssessment {
        let ctx = ctx.unwrap_or_else(|| RuleContext::for_user(user));

        let mut violations = Vec::new();
        for category in [RuleCategory::Kyc, RuleCategory::Aml] {
            for rule in self
                .rules
                .applicable_rules(&user.jurisdiction, category, &ctx)
            {
                violations.push(violation_from_rule(&rule, "user", &user.id));
            }
        }

        let aml = self.aggregator.assess_user(user);
        let decision = self.policy.decide(&violations, &aml, &[]);

        UserAssessment {
            user_id: user.id.clone(),
            violations,
            aml,
            decision,
            assessed_at: Utc::now(),
        }
    }

    // ── Fail-closed outcomes ─────────────────────────────────────────────────

    fn fail_closed_transaction(&self, tx: &Transaction, user: &User) -> ScreeningOutcome {
        ScreeningOutcome {
            transaction_id: tx.id.clone(),
            user_id: user.id.clone(),
            violations: Vec::new(),
            velocity: self
                .velocity
                .check_limits(&user.id, &self.config.velocity_limits),
            patterns: PatternScan {
                suspicious: false,
                patterns: Vec::new(),
                risk_score: 0.0,
            },
            aml: blocked_check(),
            decision: Decision {
                status: ComplianceStatus::Flagged,
                approved: false,
                reasons: vec!["internal screening failure, failing closed".to_string()],
            },
            screened_at: Utc::now(),
        }
    }

    fn fail_closed_user(&self, user: &User) -> UserAssessment {
        UserAssessment {
            user_id: user.id.clone(),
            violations: Vec::new(),
            aml: blocked_check(),
            decision: Decision {
                status: ComplianceStatus::Flagged,
                approved: false,
                reasons: vec!["internal assessment failure, failing closed".to_string()],
            },
            assessed_at: Utc::now(),
        }
    }

    // ── Side channels ────────────────────────────────────────────────────────

    fn audit_screening(&self, outcome: &ScreeningOutcome) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = AuditEntry {
            action: "transaction_screened".to_string(),
            entity_type: "transaction".to_string(),
            entity_id: outcome.transaction_id.clone(),
            details: serde_json::json!({
                "risk_score": outcome.aml.risk_score,
                "recommendation": outcome.aml.recommendation,
                "violations": outcome.violations.len(),
                "approved": outcome.decision.approved,
            }),
            at: outcome.screened_at,
        };
        if let Err(err) = audit.record_action(&entry) {
            log::error!(
                "audit write failed for {} (result still returned): {err}",
                outcome.transaction_id
            );
        }
    }

    fn alert_screening(&self, outcome: &ScreeningOutcome) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        let critical = outcome
            .velocity
            .flags
            .iter()
            .any(|f| f.severity == Severity::Critical)
            || outcome
                .violations
                .iter()
                .any(|v| v.severity == Severity::Critical);
        if outcome.aml.recommendation == Recommendation::Approve && !critical {
            return;
        }
        alerts.trigger_alert(&ComplianceAlert {
            severity: if critical {
                Severity::Critical
            } else {
                Severity::High
            },
            title: "Transaction screening alert".to_string(),
            description: format!(
                "Transaction {} scored {:.2} ({:?})",
                outcome.transaction_id, outcome.aml.risk_score, outcome.aml.recommendation
            ),
            entity_id: outcome.transaction_id.clone(),
            recommendation: outcome.aml.recommendation,
        });
    }
}

/// Maximum-risk AML check used when evaluation fails internally.
fn blocked_check() -> AmlCheck {
    AmlCheck {
        risk_score: 100.0,
        factors: Vec::new(),
        thresholds: Vec::new(),
        recommendation: Recommendation::Block,
        provider: "internal".to_string(),
        checked_at: Utc::now(),
    }
}

fn violation_from_rule(
    rule: &crate::rule_store::ComplianceRule,
    entity_type: &str,
    entity_id: &str,
) -> ComplianceViolation {
    let description = rule
        .actions
        .first()
        .map(|a| a.description.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Rule {} matched", rule.id));

    ComplianceViolation {
        id: Uuid::new_v4().to_string(),
        rule_id: rule.id.clone(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        jurisdiction: rule.jurisdiction.clone(),
        category: rule.category,
        severity: rule.severity,
        description,
        details: BTreeMap::from([
            ("rule_version".to_string(), rule.version.into()),
            (
                "actions".to_string(),
                serde_json::to_value(&rule.actions).unwrap_or(Value::Null),
            ),
        ]),
        detected_at: Utc::now(),
        status: ViolationStatus::Open,
        escalated: rule.severity == Severity::Critical,
    }
}

// ── Background cleanup ───────────────────────────────────────────────────────

/// Periodic eviction of stale velocity state. Runs on its own thread
/// and never blocks foreground screening; stops on `stop()` or process
/// shutdown.
pub struct CleanupTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Spawn the cleanup loop. Production use passes one hour; tests
    /// pass something tiny.
    pub fn spawn(tracker: Arc<VelocityTracker>, interval: StdDuration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            // Sleep in short slices so stop() is responsive.
            let slice = StdDuration::from_millis(50).min(interval);
            let mut elapsed = StdDuration::ZERO;
            while !stop_flag.load(Ordering::Relaxed) {
                std::thread::sleep(slice);
                elapsed += slice;
                if elapsed >= interval {
                    tracker.evict_inactive(Utc::now());
                    elapsed = StdDuration::ZERO;
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
