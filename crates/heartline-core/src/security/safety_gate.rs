//! Safety gate: scans a composed reply for disallowed medical phrasing, injects the disclaimer,
//! and grades severity. Patterns are compiled once and matched against lowercased text.

use crate::shared::{ConversationState, SafetyFlag, MAX_MESSAGE_CHARS};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Appended at most once to any reply that touches medical ground.
pub const DISCLAIMER: &str =
    "\n\n*This is not medical advice. Please consult your healthcare provider for personalized guidance.*";

/// Marker used to detect an existing disclaimer.
const DISCLAIMER_MARKER: &str = "This is not medical advice.";

/// Delivered in place of any reply flagged [`SafetyFlag::UnsafeContent`].
pub const SAFE_FALLBACK: &str = "I'm not able to share that response. I can help you understand your activity, \
sleep, and blood pressure data, but for anything about diagnoses or medications please talk with your \
healthcare provider.";

/// Phrases that presume a diagnosis or direct a medication change. Blocking.
const UNSAFE_PATTERNS: &[&str] = &[
    r"you have \w+ condition",
    r"stop taking",
    r"change your medication",
    r"this indicates \w+ disease",
    r"you should \w+ your medication",
    r"increase your dose",
    r"decrease your dose",
    r"you need to see a \w+ specialist",
    r"this is a sign of \w+",
    r"you are suffering from \w+",
];

/// Advice-shaped phrasing. Flagged, not blocked.
const MEDICAL_ADVICE_PATTERNS: &[&str] = &[
    r"take \w+ medication",
    r"prescribe \w+",
    r"diagnose \w+",
    r"treatment for \w+",
    r"medical condition",
    r"health condition",
];

const EMERGENCY_PATTERNS: &[&str] = &[r"call 911", r"emergency", r"immediately", r"urgent", r"critical"];

/// Vocabulary that forces the disclaimer even when the intent did not.
const MEDICAL_TERMS: &[&str] = &[
    "medication",
    "medicine",
    "pill",
    "dosage",
    "prescription",
    "diagnose",
    "diagnosis",
    "treatment",
    "doctor",
    "specialist",
    "symptom",
    "condition",
    "disease",
    "health",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static UNSAFE_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(UNSAFE_PATTERNS));
static MEDICAL_ADVICE_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(MEDICAL_ADVICE_PATTERNS));
static EMERGENCY_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(EMERGENCY_PATTERNS));

fn any_match(set: &[Regex], text: &str) -> bool {
    set.iter().any(|re| re.is_match(text))
}

/// Result of inspecting the last message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafetyVerdict {
    pub flags: BTreeSet<SafetyFlag>,
    /// Last message content after disclaimer injection.
    pub content: String,
}

/// Severity of a turn, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Urgent,
    Medium,
    High,
}

/// Summary of the safety outcome for a finished turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub safety_flags: BTreeSet<SafetyFlag>,
    pub risk_level: RiskLevel,
    pub requires_disclaimer: bool,
    pub is_safe: bool,
    pub message_count: usize,
}

/// Strategy for validating a composed reply.
#[async_trait]
pub trait SafetyValidator: Send + Sync {
    async fn evaluate(&self, state: &ConversationState) -> SafetyVerdict;
}

/// A reply carrying [`SafetyFlag::UnsafeContent`] must never be delivered as-is.
pub fn should_block(flags: &BTreeSet<SafetyFlag>) -> bool {
    flags.contains(&SafetyFlag::UnsafeContent)
}

/// Worst-first: unsafe content, then a needed disclaimer, then a verified emergency.
pub fn risk_level(flags: &BTreeSet<SafetyFlag>) -> RiskLevel {
    if flags.contains(&SafetyFlag::UnsafeContent) {
        RiskLevel::High
    } else if flags.contains(&SafetyFlag::NeedsDisclaimer) {
        RiskLevel::Medium
    } else if flags.contains(&SafetyFlag::EmergencyVerified) {
        RiskLevel::Urgent
    } else {
        RiskLevel::Low
    }
}

pub fn safety_report(state: &ConversationState) -> SafetyReport {
    SafetyReport {
        safety_flags: state.safety_flags.clone(),
        risk_level: risk_level(&state.safety_flags),
        requires_disclaimer: state.requires_disclaimer,
        is_safe: !should_block(&state.safety_flags),
        message_count: state.messages.len(),
    }
}

/// Heuristic score in `[0, 1]`: penalizes diagnostic language, rewards disclaimer phrasing.
pub fn safety_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let mut score: f64 = 1.0;
    if ["you have", "diagnose", "prescribe", "medication change"]
        .iter()
        .any(|t| lower.contains(t))
    {
        score -= 0.5;
    }
    if lower.contains("not medical advice") {
        score += 0.2;
    }
    if lower.contains("consult your healthcare provider") {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// An escalation reply must point to emergency services and ask for action now.
pub fn validate_emergency_response(text: &str) -> bool {
    let lower = text.to_lowercase();
    let has_contact = lower.contains("call 911") || lower.contains("emergency");
    let has_urgency = lower.contains("immediately") || lower.contains("now");
    has_contact && has_urgency
}

/// Default validator: fixed regex sets plus the medical vocabulary list.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternSafetyGate;

impl PatternSafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Pure inspection of one reply. Disclaimer injection is idempotent.
    pub fn inspect(&self, content: &str, requires_disclaimer: bool) -> SafetyVerdict {
        let lower = content.to_lowercase();
        let mut flags = BTreeSet::new();

        if any_match(&UNSAFE_RE, &lower) {
            flags.insert(SafetyFlag::UnsafeContent);
        }
        if any_match(&MEDICAL_ADVICE_RE, &lower) {
            flags.insert(SafetyFlag::MedicalAdviceDetected);
        }
        if any_match(&EMERGENCY_RE, &lower) {
            flags.insert(SafetyFlag::EmergencyVerified);
        }

        let mut out = content.to_string();
        let needs_disclaimer = requires_disclaimer || MEDICAL_TERMS.iter().any(|t| lower.contains(t));
        if needs_disclaimer && !content.contains(DISCLAIMER_MARKER) {
            // The body gives way so the disclaimer always fits within the message bound.
            let room = MAX_MESSAGE_CHARS.saturating_sub(DISCLAIMER.chars().count());
            if let Some((cut, _)) = out.char_indices().nth(room) {
                out.truncate(cut);
            }
            out.push_str(DISCLAIMER);
            flags.insert(SafetyFlag::NeedsDisclaimer);
        }

        SafetyVerdict { flags, content: out }
    }
}

#[async_trait]
impl SafetyValidator for PatternSafetyGate {
    async fn evaluate(&self, state: &ConversationState) -> SafetyVerdict {
        match state.messages.last() {
            Some(last) => self.inspect(&last.content, state.requires_disclaimer),
            None => SafetyVerdict::default(),
        }
    }
}
