//! Pattern detector heuristics and aggregate scoring.

use chrono::{DateTime, Duration, Utc};
use compliance_core::config::ScreeningConfig;
use compliance_core::patterns::{PatternDetector, PatternType};
use compliance_core::types::{
    KycStatus, RiskLevel, RiskProfile, Severity, Transaction, User,
};
use compliance_core::velocity::VelocityTracker;

fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("test timestamp")
}

fn tx(amount: f64, timestamp: DateTime<Utc>) -> Transaction {
    Transaction {
        id: "t1".to_string(),
        amount,
        currency: "USD".to_string(),
        tx_type: "transfer".to_string(),
        timestamp,
        from_address: None,
        to_address: None,
    }
}

fn user() -> User {
    User {
        id: "u1".to_string(),
        jurisdiction: "US".to_string(),
        activity_level: "normal".to_string(),
        risk_profile: RiskProfile {
            overall_risk: RiskLevel::Low,
            high_risk_countries: Vec::new(),
            politically_exposed: false,
        },
        kyc_status: KycStatus {
            level: 2,
            status: "approved".to_string(),
        },
    }
}

fn detector() -> PatternDetector {
    PatternDetector::new(&ScreeningConfig::default())
}

/// Structuring fires iff threshold*0.9 <= amount < threshold, never
/// at or above the threshold.
#[test]
fn structuring_band_boundaries() {
    let detector = detector();
    let noon = at("2026-03-02T12:00:00Z");

    let fires = |amount: f64| {
        detector
            .detect(&tx(amount, noon), &user(), None)
            .patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::Structuring)
    };

    assert!(!fires(8_999.0), "below the band");
    assert!(fires(9_000.0), "lower bound is inclusive");
    assert!(fires(9_800.0));
    assert!(fires(9_999.99));
    assert!(!fires(10_000.0), "threshold itself is reporting, not structuring");
    assert!(!fires(12_000.0), "above the threshold");
}

#[test]
fn structuring_severity_and_confidence() {
    let scan = detector().detect(&tx(9_500.0, at("2026-03-02T12:00:00Z")), &user(), None);
    let p = scan
        .patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::Structuring)
        .expect("structuring pattern");
    assert_eq!(p.severity, Severity::High);
    assert_eq!(p.confidence, 0.8);
}

/// Round numbers need amount >= 1000 and divisibility by 1000;
/// roundness counts trailing zero digits.
#[test]
fn round_number_detection() {
    let detector = detector();
    let noon = at("2026-03-02T12:00:00Z");

    let scan = detector.detect(&tx(50_000.0, noon), &user(), None);
    let p = scan
        .patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::RoundNumbers)
        .expect("round-number pattern");
    assert_eq!(p.severity, Severity::Low);
    assert_eq!(p.metadata.get("roundness").and_then(|v| v.as_u64()), Some(4));

    let none = detector.detect(&tx(1_500.0, noon), &user(), None);
    assert!(!none
        .patterns
        .iter()
        .any(|p| p.pattern_type == PatternType::RoundNumbers));
    let small = detector.detect(&tx(500.0, noon), &user(), None);
    assert!(small.patterns.is_empty());
}

/// Rapid transactions need a prior transaction under five minutes ago
/// and more than one transaction today.
#[test]
fn rapid_transactions_use_the_previous_gap() {
    let detector = detector();
    let tracker = VelocityTracker::new();
    let first = at("2026-03-02T12:00:00Z");

    let m = tracker.record("u1", &tx(100.0, first));
    let scan = detector.detect(&tx(100.0, first), &user(), Some(&m));
    assert!(
        !scan
            .patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::RapidTransactions),
        "first transaction of the day never counts as rapid"
    );

    let second = first + Duration::minutes(2);
    let m = tracker.record("u1", &tx(100.0, second));
    let scan = detector.detect(&tx(100.0, second), &user(), Some(&m));
    let p = scan
        .patterns
        .iter()
        .find(|p| p.pattern_type == PatternType::RapidTransactions)
        .expect("rapid pattern");
    assert_eq!(p.severity, Severity::Medium);
    assert_eq!(p.confidence, 0.7);

    let slow = second + Duration::minutes(30);
    let m = tracker.record("u1", &tx(100.0, slow));
    let scan = detector.detect(&tx(100.0, slow), &user(), Some(&m));
    assert!(!scan
        .patterns
        .iter()
        .any(|p| p.pattern_type == PatternType::RapidTransactions));
}

#[test]
fn unusual_timing_window() {
    let detector = detector();
    let fires = |hour: &str| {
        detector
            .detect(&tx(100.0, at(hour)), &user(), None)
            .patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::UnusualTiming)
    };
    assert!(!fires("2026-03-02T01:59:00Z"));
    assert!(fires("2026-03-02T02:00:00Z"));
    assert!(fires("2026-03-02T04:30:00Z"));
    assert!(fires("2026-03-02T06:59:00Z"));
    assert!(!fires("2026-03-02T07:00:00Z"));
    assert!(!fires("2026-03-02T14:00:00Z"));
}

/// Cross-border detection is not implemented yet and must never fire.
#[test]
fn cross_border_never_fires() {
    let mut cross = tx(100.0, at("2026-03-02T12:00:00Z"));
    cross.from_address = Some("0xabc".to_string());
    cross.to_address = Some("0xdef".to_string());
    let scan = detector().detect(&cross, &user(), None);
    assert!(!scan
        .patterns
        .iter()
        .any(|p| p.pattern_type == PatternType::CrossBorder));
}

/// Aggregate score sums fixed contributions and drives the suspicious
/// flag only above 25.
#[test]
fn aggregate_score_and_suspicious_flag() {
    let detector = detector();
    let noon = at("2026-03-02T12:00:00Z");

    // Round number alone: score 10, not suspicious.
    let round_only = detector.detect(&tx(2_000.0, noon), &user(), None);
    assert_eq!(round_only.risk_score, 10.0);
    assert!(!round_only.suspicious);

    // Structuring alone: score 30, suspicious.
    let structuring = detector.detect(&tx(9_500.0, noon), &user(), None);
    assert_eq!(structuring.risk_score, 30.0);
    assert!(structuring.suspicious);

    // Structuring at 02:00 on a round-ish amount: contributions add.
    let night = detector.detect(&tx(9_500.0, at("2026-03-02T03:00:00Z")), &user(), None);
    assert_eq!(night.risk_score, 45.0);
    assert!(night.suspicious);

    // A clean transaction produces an empty scan.
    let clean = detector.detect(&tx(123.45, noon), &user(), None);
    assert!(clean.patterns.is_empty());
    assert_eq!(clean.risk_score, 0.0);
    assert!(!clean.suspicious);
}
