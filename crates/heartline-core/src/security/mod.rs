//! Reply safety: pattern-based gate, disclaimer injection, and risk grading.

pub mod safety_gate;

pub use safety_gate::{
    risk_level, safety_report, safety_score, should_block, validate_emergency_response, PatternSafetyGate,
    RiskLevel, SafetyReport, SafetyValidator, SafetyVerdict, DISCLAIMER, SAFE_FALLBACK,
};
