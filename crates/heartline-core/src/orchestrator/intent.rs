//! Intent classification: maps the latest utterance to an [`Intent`], the disclaimer requirement,
//! and the conversation phase. Keyword tiers are checked in strict priority order.

use crate::shared::{ConversationPhase, Intent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keyword tiers, highest priority first. The first tier with any substring hit wins.
const KEYWORD_TIERS: &[(Intent, &[&str])] = &[
    (
        Intent::Emergency,
        &[
            "chest pain",
            "can't breathe",
            "emergency",
            "severe",
            "dizzy",
            "fainted",
            "heart attack",
            "stroke",
            "unconscious",
        ],
    ),
    (
        Intent::MedicalAdvice,
        &["diagnose", "medication", "prescription", "doctor", "treatment", "medicine", "pill", "dosage"],
    ),
    (
        Intent::ActivityCheck,
        &["step", "walk", "active", "exercise", "workout", "activity", "movement", "fitness"],
    ),
    (
        Intent::SleepInquiry,
        &["sleep", "rest", "bed", "tired", "insomnia", "dream", "night", "morning"],
    ),
    (
        Intent::BpMonitoring,
        &["pressure", "bp", "blood pressure", "systolic", "diastolic", "hypertension"],
    ),
    (
        Intent::KnowledgeQuery,
        &[
            "what is",
            "how does",
            "why",
            "explain",
            "tell me about",
            "information",
            "knowledge",
            "learn",
            "understand",
            "benefits",
            "risks",
            "effects",
            "impact",
            "cause",
            "prevent",
            "improve",
        ],
    ),
];

/// Shorter lists used only for the confidence breakdown.
const CONFIDENCE_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Emergency, &["chest pain", "can't breathe", "emergency", "severe"]),
    (Intent::MedicalAdvice, &["diagnose", "medication", "prescription", "doctor"]),
    (Intent::ActivityCheck, &["step", "walk", "active", "exercise"]),
    (Intent::SleepInquiry, &["sleep", "rest", "bed", "tired"]),
    (Intent::BpMonitoring, &["pressure", "bp", "blood pressure"]),
    (Intent::KnowledgeQuery, &["what is", "how does", "why", "explain", "tell me about"]),
];

const CONFIDENCE_STEP: f64 = 0.25;
const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub requires_disclaimer: bool,
    pub phase: ConversationPhase,
}

impl Classification {
    /// Derives the disclaimer requirement and phase from an intent.
    pub fn for_intent(intent: Intent) -> Self {
        let phase = match intent {
            Intent::Emergency => ConversationPhase::Emergency,
            Intent::MedicalAdvice => ConversationPhase::Advice,
            _ => ConversationPhase::Assessment,
        };
        Self {
            intent,
            requires_disclaimer: intent.requires_disclaimer(),
            phase,
        }
    }
}

/// Strategy for classifying an utterance. Total: every input yields a classification.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Classification;
}

/// Deterministic case-insensitive substring classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, utterance: &str) -> Classification {
        let lower = utterance.to_lowercase();
        let intent = KEYWORD_TIERS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::HealthQuery);
        Classification::for_intent(intent)
    }

    /// Per-intent confidence. Falls back to `HEALTH_QUERY = 0.5` when nothing matched.
    pub fn confidence(&self, utterance: &str) -> BTreeMap<Intent, f64> {
        let lower = utterance.to_lowercase();
        let mut scores = BTreeMap::new();
        for (intent, keywords) in CONFIDENCE_KEYWORDS {
            let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
            if hits > 0 {
                scores.insert(*intent, hits as f64 * CONFIDENCE_STEP);
            }
        }
        if scores.is_empty() {
            scores.insert(Intent::HealthQuery, DEFAULT_CONFIDENCE);
        }
        scores
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, utterance: &str) -> Classification {
        self.classify_text(utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent_of(text: &str) -> Intent {
        KeywordIntentClassifier.classify_text(text).intent
    }

    #[test]
    fn emergency_beats_every_other_tier() {
        assert_eq!(intent_of("I'm having chest pain and feel dizzy"), Intent::Emergency);
        assert_eq!(intent_of("severe pain after my walk, should I take medication?"), Intent::Emergency);
        assert_eq!(intent_of("What is a STROKE?"), Intent::Emergency);
    }

    #[test]
    fn tiers_follow_priority() {
        assert_eq!(intent_of("Should I stop taking my medication?"), Intent::MedicalAdvice);
        assert_eq!(intent_of("How many steps did I take?"), Intent::ActivityCheck);
        assert_eq!(intent_of("How did I sleep last night?"), Intent::SleepInquiry);
        assert_eq!(intent_of("Show my systolic readings"), Intent::BpMonitoring);
        assert_eq!(intent_of("What is HRV?"), Intent::KnowledgeQuery);
        assert_eq!(intent_of("hello there"), Intent::HealthQuery);
        assert_eq!(intent_of(""), Intent::HealthQuery);
    }

    #[test]
    fn disclaimer_and_phase_follow_intent() {
        let c = KeywordIntentClassifier.classify_text("I fainted");
        assert!(c.requires_disclaimer);
        assert_eq!(c.phase, ConversationPhase::Emergency);

        let c = KeywordIntentClassifier.classify_text("what dosage?");
        assert!(c.requires_disclaimer);
        assert_eq!(c.phase, ConversationPhase::Advice);

        let c = KeywordIntentClassifier.classify_text("my bp today");
        assert!(!c.requires_disclaimer);
        assert_eq!(c.phase, ConversationPhase::Assessment);
    }

    #[test]
    fn confidence_counts_keyword_hits() {
        let scores = KeywordIntentClassifier.confidence("walk and exercise, then sleep");
        assert_eq!(scores.get(&Intent::ActivityCheck), Some(&0.5));
        assert_eq!(scores.get(&Intent::SleepInquiry), Some(&0.25));

        let fallback = KeywordIntentClassifier.confidence("hello");
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback.get(&Intent::HealthQuery), Some(&0.5));
    }

    #[tokio::test]
    async fn trait_object_classifies() {
        let c: Box<dyn IntentClassifier> = Box::new(KeywordIntentClassifier::new());
        assert_eq!(c.classify("Tell me about the benefits of exercise").await.intent, Intent::ActivityCheck);
    }
}
