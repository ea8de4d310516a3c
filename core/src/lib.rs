//! compliance-core: rule evaluation and transaction risk decisions.
//!
//! Library-level decision engine: every transaction and user action on
//! the platform passes through [`engine::ComplianceDecisionEngine`]
//! before being accepted. Rules are matched per jurisdiction and
//! category, rolling per-user velocity state feeds heuristic pattern
//! detectors, and weighted risk factors aggregate into a bounded score
//! and an approve / flag / manual-review / block recommendation.
//!
//! The engine is deterministic, auditable and fail-closed: an internal
//! failure produces a maximum-risk, not-approved result.

pub mod condition;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod patterns;
pub mod risk;
pub mod rule_store;
pub mod types;
pub mod velocity;
