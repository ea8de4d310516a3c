//! Per-user rolling transaction aggregates.
//!
//! Window resets are anchored to the user's PREVIOUS transaction, not
//! to fixed clock boundaries:
//!   - daily counters reset when the calendar date (UTC) differs from
//!     the last transaction's date,
//!   - weekly volume resets when the gap since the last transaction
//!     exceeds 7 x 24h,
//!   - monthly volume resets when the month or year differs.
//! A user who transacts exactly once a week therefore never resets
//! weekly volume. This anchor-to-last-event behaviour is a deliberate
//! policy choice; see DESIGN.md before changing it.
//!
//! Metrics are exclusively owned by the tracker. Same-user updates are
//! serialised by the map's shard locks; cross-user operations need no
//! coordination.

use crate::config::VelocityLimits;
use crate::types::{Severity, Transaction, UserId};
use chrono::{DateTime, Datelike, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Entries idle at least this long are dropped by the cleanup pass.
pub const INACTIVITY_EVICTION_DAYS: i64 = 30;

// ── Metrics ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityMetrics {
    pub daily_count: u32,
    pub daily_volume: f64,
    pub weekly_volume: f64,
    pub monthly_volume: f64,
    pub last_transaction_at: DateTime<Utc>,
    /// Timestamp of the transaction before the last one, kept for gap
    /// heuristics (rapid-transaction detection).
    pub previous_transaction_at: Option<DateTime<Utc>>,
    /// Suspicious-pattern tags observed for this user so far.
    pub pattern_tags: Vec<String>,
}

impl VelocityMetrics {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            daily_volume: 0.0,
            weekly_volume: 0.0,
            monthly_volume: 0.0,
            last_transaction_at: at,
            previous_transaction_at: None,
            pattern_tags: Vec::new(),
        }
    }

    /// Apply the anchor-to-last-event resets for a transaction at `now`.
    fn roll_windows(&mut self, now: DateTime<Utc>) {
        let last = self.last_transaction_at;
        if now.date_naive() != last.date_naive() {
            self.daily_count = 0;
            self.daily_volume = 0.0;
        }
        if now.signed_duration_since(last) > Duration::hours(7 * 24) {
            self.weekly_volume = 0.0;
        }
        if now.month() != last.month() || now.year() != last.year() {
            self.monthly_volume = 0.0;
        }
    }
}

// ── Limit check result ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityFlagType {
    DailyCountExceeded,
    DailyVolumeExceeded,
    WeeklyVolumeExceeded,
    MonthlyVolumeExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityFlag {
    pub flag_type: VelocityFlagType,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityCheckResult {
    pub limit_exceeded: bool,
    /// Limit and current value of the first breached cap (checked in
    /// daily-count, daily-volume, weekly, monthly order), or the daily
    /// volume cap when nothing is breached.
    pub limit: f64,
    pub current: f64,
    pub timeframe: Timeframe,
    pub flags: Vec<VelocityFlag>,
}

impl VelocityCheckResult {
    fn clear(limits: &VelocityLimits) -> Self {
        Self {
            limit_exceeded: false,
            limit: limits.daily_volume,
            current: 0.0,
            timeframe: Timeframe::Daily,
            flags: Vec::new(),
        }
    }
}

// ── Tracker ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct VelocityTracker {
    metrics: DashMap<UserId, VelocityMetrics>,
}

impl VelocityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_users(&self) -> usize {
        self.metrics.len()
    }

    pub fn metrics_for(&self, user_id: &str) -> Option<VelocityMetrics> {
        self.metrics.get(user_id).map(|m| m.clone())
    }

    /// Fold a transaction into the user's rolling state and return the
    /// updated metrics. State is created lazily on first use. The
    /// entry guard holds the shard lock for the whole update, so
    /// concurrent transactions for one user never lose counts.
    pub fn record(&self, user_id: &str, tx: &Transaction) -> VelocityMetrics {
        match self.metrics.entry(user_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let metrics = occupied.get_mut();
                metrics.roll_windows(tx.timestamp);
                metrics.daily_count += 1;
                metrics.daily_volume += tx.amount;
                metrics.weekly_volume += tx.amount;
                metrics.monthly_volume += tx.amount;
                metrics.previous_transaction_at = Some(metrics.last_transaction_at);
                metrics.last_transaction_at = tx.timestamp;
                metrics.clone()
            }
            Entry::Vacant(vacant) => {
                let mut metrics = VelocityMetrics::new(tx.timestamp);
                metrics.daily_count = 1;
                metrics.daily_volume = tx.amount;
                metrics.weekly_volume = tx.amount;
                metrics.monthly_volume = tx.amount;
                vacant.insert(metrics.clone());
                metrics
            }
        }
    }

    /// Record a suspicious-pattern tag against the user's history.
    pub fn note_pattern(&self, user_id: &str, tag: &str) {
        if let Some(mut entry) = self.metrics.get_mut(user_id) {
            if !entry.pattern_tags.iter().any(|t| t == tag) {
                entry.pattern_tags.push(tag.to_string());
            }
        }
    }

    /// Evaluate the four caps independently. Severity escalates with
    /// timeframe breadth; confidences are fixed in [0.90, 0.95].
    pub fn check_limits(&self, user_id: &str, limits: &VelocityLimits) -> VelocityCheckResult {
        let Some(metrics) = self.metrics.get(user_id) else {
            return VelocityCheckResult::clear(limits);
        };

        let mut flags = Vec::new();
        // (limit, current, timeframe) of the first breach.
        let mut first_breach: Option<(f64, f64, Timeframe)> = None;

        if metrics.daily_count > limits.daily_count {
            flags.push(VelocityFlag {
                flag_type: VelocityFlagType::DailyCountExceeded,
                severity: Severity::Medium,
                confidence: 0.90,
                description: format!(
                    "{} transactions today exceeds the cap of {}",
                    metrics.daily_count, limits.daily_count
                ),
            });
            first_breach.get_or_insert((
                limits.daily_count as f64,
                metrics.daily_count as f64,
                Timeframe::Daily,
            ));
        }
        if metrics.daily_volume > limits.daily_volume {
            flags.push(VelocityFlag {
                flag_type: VelocityFlagType::DailyVolumeExceeded,
                severity: Severity::High,
                confidence: 0.90,
                description: format!(
                    "Daily volume {:.2} exceeds the cap of {:.2}",
                    metrics.daily_volume, limits.daily_volume
                ),
            });
            first_breach.get_or_insert((
                limits.daily_volume,
                metrics.daily_volume,
                Timeframe::Daily,
            ));
        }
        if metrics.weekly_volume > limits.weekly_volume {
            flags.push(VelocityFlag {
                flag_type: VelocityFlagType::WeeklyVolumeExceeded,
                severity: Severity::High,
                confidence: 0.92,
                description: format!(
                    "Weekly volume {:.2} exceeds the cap of {:.2}",
                    metrics.weekly_volume, limits.weekly_volume
                ),
            });
            first_breach.get_or_insert((
                limits.weekly_volume,
                metrics.weekly_volume,
                Timeframe::Weekly,
            ));
        }
        if metrics.monthly_volume > limits.monthly_volume {
            flags.push(VelocityFlag {
                flag_type: VelocityFlagType::MonthlyVolumeExceeded,
                severity: Severity::Critical,
                confidence: 0.95,
                description: format!(
                    "Monthly volume {:.2} exceeds the cap of {:.2}",
                    metrics.monthly_volume, limits.monthly_volume
                ),
            });
            first_breach.get_or_insert((
                limits.monthly_volume,
                metrics.monthly_volume,
                Timeframe::Monthly,
            ));
        }

        match first_breach {
            Some((limit, current, timeframe)) => VelocityCheckResult {
                limit_exceeded: true,
                limit,
                current,
                timeframe,
                flags,
            },
            None => VelocityCheckResult {
                current: metrics.daily_volume,
                ..VelocityCheckResult::clear(limits)
            },
        }
    }

    /// Drop users inactive for `INACTIVITY_EVICTION_DAYS` or longer.
    /// Returns the number of evicted entries.
    pub fn evict_inactive(&self, now: DateTime<Utc>) -> usize {
        let before = self.metrics.len();
        self.metrics.retain(|_, metrics| {
            now.signed_duration_since(metrics.last_transaction_at)
                < Duration::days(INACTIVITY_EVICTION_DAYS)
        });
        let evicted = before - self.metrics.len();
        if evicted > 0 {
            log::debug!("evicted {evicted} inactive velocity entries");
        }
        evicted
    }
}
