//! Response composition: one template per intent. Templates open with empathy, cite a concrete
//! value, offer one action, and close with encouragement or a question. Emergency and medical
//! advice use fixed texts.

use crate::error::PipelineError;
use crate::knowledge::HealthData;
use crate::shared::Intent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EMERGENCY_RESPONSE: &str = "I'm concerned about your symptoms. Please call 911 or your emergency \
number immediately. If someone is with you, ask them to help. Your safety is the top priority.";

pub const MEDICAL_REFUSAL: &str = "I understand you have questions about your health. While I can help you \
understand your data, I cannot provide medical advice. Please consult your healthcare provider for \
personalized medical guidance.";

/// Used whenever a template's required values are missing.
pub const SYNC_FALLBACK: &str = "Thanks for checking in! I couldn't find recent readings for that yet. \
Please sync your device so I can look at your latest data. Would you like me to check again afterwards?";

const KNOWLEDGE_FALLBACK: &str = "Great question! I don't have trusted reference material on that topic \
yet. Try asking about exercise, sleep, blood pressure, or stress. What would you like to learn about?";

const OFF_TOPIC_RESPONSE: &str = "I appreciate the question! I'm best at helping with your activity, sleep, \
and blood pressure. Try asking how many steps you took today. What would you like to check?";

/// Strategy for turning an intent and its retrieved data into reply text.
#[async_trait]
pub trait ResponseComposer: Send + Sync {
    async fn compose(&self, intent: Intent, data: &HealthData) -> Result<String, PipelineError>;
}

/// Deterministic per-intent templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateComposer;

impl TemplateComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, intent: Intent, data: &HealthData) -> String {
        let rendered = match intent {
            Intent::Emergency => return EMERGENCY_RESPONSE.to_string(),
            Intent::MedicalAdvice => return MEDICAL_REFUSAL.to_string(),
            Intent::OffTopic => return OFF_TOPIC_RESPONSE.to_string(),
            Intent::KnowledgeQuery => {
                return knowledge_response(data).unwrap_or_else(|| KNOWLEDGE_FALLBACK.to_string())
            }
            Intent::ActivityCheck => activity_response(data),
            Intent::SleepInquiry => sleep_response(data),
            Intent::BpMonitoring => bp_response(data),
            Intent::HealthQuery => overview_response(data),
        };
        rendered.unwrap_or_else(|| SYNC_FALLBACK.to_string())
    }
}

#[async_trait]
impl ResponseComposer for TemplateComposer {
    async fn compose(&self, intent: Intent, data: &HealthData) -> Result<String, PipelineError> {
        Ok(self.render(intent, data))
    }
}

/// Renders a scalar for display. Strings lose their quotes; other values use JSON text.
fn display(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Thousands separators for whole numbers (6500 -> "6,500"). Non-integers pass through.
fn count(v: &Value) -> Option<String> {
    let Some(n) = v.as_i64() else {
        return display(v);
    };
    let digits = n.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    Some(out)
}

fn activity_response(data: &HealthData) -> Option<String> {
    let steps = data.get("steps")?;
    let today = count(steps.get("today")?)?;
    let progress = data.get("weekly_progress").and_then(display);
    let daily_avg = steps.get("daily_avg").and_then(count);

    let mut out = format!("You're doing great! You've taken {today} steps today");
    match progress {
        Some(p) => out.push_str(&format!(" and you're at {p} of your weekly goal.")),
        None => out.push('.'),
    }
    if let Some(avg) = daily_avg {
        out.push_str(&format!(" That's {avg} steps on average this week."));
    }
    out.push_str(" Keep up the momentum! Would you like a reminder for an evening walk?");
    Some(out)
}

fn sleep_response(data: &HealthData) -> Option<String> {
    let sleep = data.get("sleep")?;
    let night = sleep.get("last_night").unwrap_or(sleep);
    let hours = night.get("hours").and_then(display);
    let quality = night.get("quality_score").and_then(display);

    let summary = match (hours, quality) {
        (Some(h), Some(q)) => format!("You slept {h} hours last night with a quality score of {q}."),
        (Some(h), None) => format!("You slept {h} hours last night."),
        (None, Some(q)) => format!("Your sleep quality score last night was {q}."),
        (None, None) => return None,
    };
    Some(format!(
        "Thanks for asking about your rest. {summary} Most adults feel best with 7-8 hours. \
Try keeping a consistent bedtime routine tonight. How do you feel this morning?"
    ))
}

fn bp_response(data: &HealthData) -> Option<String> {
    let bp = data.get("blood_pressure")?;
    let latest = bp.get("latest")?;
    let systolic = display(latest.get("systolic")?)?;
    let diastolic = display(latest.get("diastolic")?)?;
    let trend = bp.get("trend").and_then(display);

    let mut out = format!(
        "Thanks for keeping an eye on your blood pressure. Your latest reading is {systolic}/{diastolic} mmHg"
    );
    match trend {
        Some(t) => out.push_str(&format!(" and your recent trend is {t}.")),
        None => out.push('.'),
    }
    out.push_str(" Try measuring at the same time each morning for consistent readings. How have you been feeling this week?");
    Some(out)
}

fn overview_response(data: &HealthData) -> Option<String> {
    let mut facts = Vec::new();
    if let Some(steps) = data.get("steps_today").and_then(count) {
        facts.push(format!("{steps} steps today"));
    }
    if let Some(q) = data.get("sleep_quality").and_then(display) {
        facts.push(format!("a sleep quality score of {q}"));
    }
    if let Some(latest) = data.get("blood_pressure") {
        let reading = latest
            .get("systolic")
            .and_then(display)
            .zip(latest.get("diastolic").and_then(display));
        if let Some((s, d)) = reading {
            facts.push(format!("a latest blood pressure reading of {s}/{d} mmHg"));
        }
    }
    if facts.is_empty() {
        return None;
    }
    let joined = match facts.len() {
        1 => facts[0].clone(),
        n => format!("{} and {}", facts[..n - 1].join(", "), facts[n - 1]),
    };
    Some(format!(
        "Thanks for checking in! Here's your snapshot: {joined}. \
Try a short walk after your next meal. Which would you like to explore further?"
    ))
}

fn knowledge_response(data: &HealthData) -> Option<String> {
    let top = data.get("knowledge")?.as_array()?.first()?;
    let text = top.get("text").and_then(display)?;
    let source = top.get("source").and_then(display);

    let mut out = format!("Great question! Here's what I found: {text}");
    if let Some(src) = source {
        out.push_str(&format!(" (Source: {src})"));
    }
    out.push_str(" Try picking one small change to focus on this week. Would you like to see how this relates to your own data?");
    Some(out)
}

/// Shape checks on a composed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub word_count: usize,
    pub has_encouragement: bool,
    pub has_action_item: bool,
    pub has_question: bool,
    pub tone: String,
}

pub fn response_metrics(text: &str) -> ResponseMetrics {
    let lower = text.to_lowercase();
    let has_encouragement = ["great", "good", "excellent", "keep up", "well done", "doing great"]
        .iter()
        .any(|w| lower.contains(w));
    let has_action_item = ["try", "consider", "would you like", "shall i", "please", "remind"]
        .iter()
        .any(|w| lower.contains(w));
    let tone = if lower.contains("emergency") || lower.contains("911") {
        "urgent"
    } else if has_encouragement {
        "encouraging"
    } else if lower.contains("help") || lower.contains("support") {
        "helpful"
    } else {
        "neutral"
    };
    ResponseMetrics {
        word_count: text.split_whitespace().count(),
        has_encouragement,
        has_action_item,
        has_question: text.contains('?'),
        tone: tone.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: Value) -> HealthData {
        match v {
            Value::Object(m) => m,
            _ => HealthData::new(),
        }
    }

    fn render(intent: Intent, v: Value) -> String {
        TemplateComposer.render(intent, &data(v))
    }

    #[test]
    fn activity_cites_steps_and_progress() {
        let out = render(
            Intent::ActivityCheck,
            json!({"steps": {"today": 6500, "daily_avg": 5857}, "weekly_progress": "83.7%"}),
        );
        assert!(out.contains("6,500 steps today"));
        assert!(out.contains("83.7% of your weekly goal"));
        assert!(out.contains("5,857"));
        assert!(out.ends_with('?'));
    }

    #[test]
    fn sleep_accepts_flat_and_nested_shapes() {
        let flat = render(Intent::SleepInquiry, json!({"sleep": {"hours": 7.2, "quality_score": 78}}));
        assert!(flat.contains("7.2 hours") && flat.contains("quality score of 78"));
        let nested = render(
            Intent::SleepInquiry,
            json!({"sleep": {"last_night": {"hours": 6.1, "quality_score": 55}}}),
        );
        assert!(nested.contains("6.1 hours") && nested.contains("55"));
    }

    #[test]
    fn sleep_reply_avoids_medical_vocabulary() {
        let out = render(Intent::SleepInquiry, json!({"sleep": {"hours": 7.2, "quality_score": 78}})).to_lowercase();
        for term in ["health", "doctor", "condition", "medic"] {
            assert!(!out.contains(term), "{term}");
        }
    }

    #[test]
    fn bp_cites_reading_and_trend() {
        let out = render(
            Intent::BpMonitoring,
            json!({"blood_pressure": {"latest": {"systolic": 128, "diastolic": 82}, "trend": "improving"}}),
        );
        assert!(out.contains("128/82 mmHg"));
        assert!(out.contains("improving"));
    }

    #[test]
    fn overview_joins_available_facts() {
        let out = render(
            Intent::HealthQuery,
            json!({"steps_today": 6500, "sleep_quality": 78, "blood_pressure": {"systolic": 128, "diastolic": 82}}),
        );
        assert!(out.contains("6,500 steps today, a sleep quality score of 78 and a latest blood pressure"));
    }

    #[test]
    fn missing_data_falls_back_to_sync_prompt() {
        assert_eq!(render(Intent::ActivityCheck, json!({})), SYNC_FALLBACK);
        assert_eq!(render(Intent::SleepInquiry, json!({"sleep": {}})), SYNC_FALLBACK);
        assert_eq!(render(Intent::BpMonitoring, json!({"blood_pressure": {"trend": "stable"}})), SYNC_FALLBACK);
        assert_eq!(render(Intent::HealthQuery, json!({})), SYNC_FALLBACK);
    }

    #[test]
    fn knowledge_cites_top_snippet() {
        let out = render(
            Intent::KnowledgeQuery,
            json!({"knowledge": [{"text": "HRV reflects recovery.", "source": "HRV Research", "topic": "hrv"}]}),
        );
        assert!(out.contains("HRV reflects recovery. (Source: HRV Research)"));
        assert_eq!(render(Intent::KnowledgeQuery, json!({"knowledge": []})), KNOWLEDGE_FALLBACK);
    }

    #[test]
    fn fixed_texts_for_emergency_and_medical() {
        assert_eq!(render(Intent::Emergency, json!({"steps": {"today": 1}})), EMERGENCY_RESPONSE);
        assert_eq!(render(Intent::MedicalAdvice, json!({})), MEDICAL_REFUSAL);
        assert!(!EMERGENCY_RESPONSE.contains('?'));
    }

    #[test]
    fn every_template_stays_short() {
        let full = data(json!({
            "steps": {"today": 6500, "daily_avg": 5857},
            "weekly_progress": "83.7%",
            "sleep": {"hours": 7.2, "quality_score": 78},
            "blood_pressure": {"latest": {"systolic": 128, "diastolic": 82}, "trend": "improving", "systolic": 128, "diastolic": 82},
            "steps_today": 6500,
            "sleep_quality": 78,
        }));
        for intent in Intent::ALL {
            let out = TemplateComposer.render(intent, &full);
            assert!(response_metrics(&out).word_count < 100, "{intent}: {out}");
        }
    }

    #[test]
    fn metrics_detect_shape() {
        let m = response_metrics("You're doing great! Would you like a reminder?");
        assert!(m.has_encouragement && m.has_action_item && m.has_question);
        assert_eq!(m.tone, "encouraging");
        assert_eq!(response_metrics(EMERGENCY_RESPONSE).tone, "urgent");
        assert_eq!(count(&json!(1234567)).as_deref(), Some("1,234,567"));
        assert_eq!(count(&json!(950)).as_deref(), Some("950"));
    }
}
