//! screen-runner: headless screening runner for the compliance engine.
//!
//! Usage:
//!   screen-runner --jurisdictions rules.json --config screening.json
//!   screen-runner --batch 50
//!
//! Runs a deterministic synthetic batch through the engine and prints
//! every decision plus a summary. Useful for eyeballing calibration
//! changes before they ship.

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use compliance_core::config::{self, JurisdictionProfile, KycRequirement, ScreeningConfig};
use compliance_core::engine::ComplianceDecisionEngine;
use compliance_core::rule_store::RuleStore;
use compliance_core::types::{KycStatus, RiskLevel, RiskProfile, Transaction, User};
use compliance_core::velocity::VelocityTracker;
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let batch = parse_arg(&args, "--batch", 20u64);
    let jurisdictions_path = args
        .windows(2)
        .find(|w| w[0] == "--jurisdictions")
        .map(|w| w[1].as_str());
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());

    let profiles = match jurisdictions_path {
        Some(path) => config::load_jurisdictions(path)?,
        None => builtin_profiles(),
    };
    let screening = match config_path {
        Some(path) => ScreeningConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ScreeningConfig::default(),
    };

    println!("screen-runner");
    println!("  jurisdictions: {}", profiles.len());
    println!("  batch size:    {batch}");
    println!();

    let rules = Arc::new(RuleStore::new());
    let seeded = rules.seed_from_jurisdictions(&profiles)?;
    log::info!("rule store ready with {seeded} rules");

    let velocity = Arc::new(VelocityTracker::new());
    let engine = ComplianceDecisionEngine::new(screening, rules, Arc::clone(&velocity));
    let cleanup = engine.start_cleanup(StdDuration::from_secs(3600));

    let users = [
        user("alice", RiskLevel::Low, false),
        user("bob", RiskLevel::High, false),
        user("carol", RiskLevel::Medium, true),
    ];

    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_else(Utc::now);

    for i in 0..batch {
        let user = &users[(i % 3) as usize];
        let tx = synthetic_transaction(i, start + Duration::minutes(i as i64 * 3));
        let outcome = engine.screen_transaction(&tx, user, None);

        println!(
            "  {:<6} {:>10.2} {:<3} {:<18} user={:<6} score={:>6.2} {:?}{}",
            tx.id,
            tx.amount,
            tx.currency,
            tx.tx_type,
            user.id,
            outcome.aml.risk_score,
            outcome.aml.recommendation,
            if outcome.violations.is_empty() {
                String::new()
            } else {
                format!("  [{} violation(s)]", outcome.violations.len())
            },
        );

        *counts
            .entry(format!("{:?}", outcome.aml.recommendation))
            .or_default() += 1;
    }

    println!();
    println!("=== BATCH SUMMARY ===");
    for (recommendation, count) in &counts {
        println!("  {recommendation:<14} {count}");
    }
    println!("  tracked users: {}", velocity.tracked_users());

    cleanup.stop();
    Ok(())
}

/// A fixed rotation of transaction shapes so every recommendation tier
/// shows up in a default batch.
fn synthetic_transaction(i: u64, at: chrono::DateTime<chrono::Utc>) -> Transaction {
    let (amount, tx_type) = match i % 5 {
        0 => (250.0 + i as f64, "transfer"),
        1 => (9_800.0, "transfer"),
        2 => (50_000.0, "wire_transfer"),
        3 => (3_000.0, "bridge"),
        _ => (1_200.0 + i as f64, "payment"),
    };
    Transaction {
        id: format!("t{i:04}"),
        amount,
        currency: "USD".to_string(),
        tx_type: tx_type.to_string(),
        timestamp: at,
        from_address: Some(format!("0xsrc{:02}", i % 7)),
        to_address: Some(format!("0xdst{:02}", i % 5)),
    }
}

fn user(id: &str, risk: RiskLevel, politically_exposed: bool) -> User {
    User {
        id: id.to_string(),
        jurisdiction: "US".to_string(),
        activity_level: "normal".to_string(),
        risk_profile: RiskProfile {
            overall_risk: risk,
            high_risk_countries: Vec::new(),
            politically_exposed,
        },
        kyc_status: KycStatus {
            level: 2,
            status: "approved".to_string(),
        },
    }
}

fn builtin_profiles() -> Vec<JurisdictionProfile> {
    vec![JurisdictionProfile {
        code: "US".to_string(),
        name: "United States".to_string(),
        reporting_thresholds: BTreeMap::from([("USD".to_string(), 10_000.0)]),
        requirements: Vec::new(),
        kyc: Some(KycRequirement {
            min_level: 2,
            required_status: "approved".to_string(),
        }),
    }]
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
