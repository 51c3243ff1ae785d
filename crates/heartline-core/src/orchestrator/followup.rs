//! Follow-up evaluation: checks retrieved data for low activity, poor sleep, or a worsening
//! blood pressure trend and proposes a nudge. Rules are independent; when several fire, the
//! last one's text wins.

use crate::knowledge::HealthData;
use crate::shared::NudgeType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Weekly progress (percent) below which an activity nudge fires.
pub const ACTIVITY_PROGRESS_THRESHOLD: f64 = 50.0;
/// Sleep quality score below which a sleep nudge fires.
pub const SLEEP_QUALITY_THRESHOLD: f64 = 60.0;

const SLEEP_NUDGE: &str =
    "Your sleep quality was lower last night. Would you like some tips for better rest tonight?";
const BP_NUDGE: &str = "I notice your blood pressure trend is concerning. Would you like to discuss this \
with your healthcare provider?";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpDecision {
    pub needed: bool,
    pub nudge_text: Option<String>,
    pub nudge_type: Option<NudgeType>,
}

/// Scores in `[0, 1]` summarizing how the user is tracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpMetrics {
    pub activity_score: Option<f64>,
    pub sleep_score: Option<f64>,
    pub bp_score: Option<f64>,
    pub overall_score: Option<f64>,
}

/// Parses `"40%"`, `"40.5"`, or a bare number. Anything else reads as zero.
fn parse_progress(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn sleep_quality(data: &HealthData) -> Option<f64> {
    let sleep = data.get("sleep")?;
    sleep
        .get("last_night")
        .and_then(|n| n.get("quality_score"))
        .or_else(|| sleep.get("quality_score"))
        .and_then(Value::as_f64)
}

fn bp_trend(data: &HealthData) -> Option<&str> {
    data.get("blood_pressure")?.get("trend")?.as_str()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FollowUpEvaluator;

impl FollowUpEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, data: &HealthData) -> FollowUpDecision {
        let mut decision = FollowUpDecision::default();

        if data.contains_key("steps") || data.contains_key("weekly_progress") {
            let progress = data.get("weekly_progress").map(parse_progress).unwrap_or(0.0);
            if progress < ACTIVITY_PROGRESS_THRESHOLD {
                let shown = data
                    .get("weekly_progress")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{progress:.1}%"));
                decision.needed = true;
                decision.nudge_text = Some(format!(
                    "You're at {shown} of your weekly step goal. A 10-minute walk could boost your energy! \
Shall I remind you later?"
                ));
                decision.nudge_type = Some(NudgeType::GoalCheck);
            }
        }

        if let Some(q) = sleep_quality(data) {
            if q < SLEEP_QUALITY_THRESHOLD {
                decision.needed = true;
                decision.nudge_text = Some(SLEEP_NUDGE.to_string());
                decision.nudge_type = Some(NudgeType::GentleReminder);
            }
        }

        if bp_trend(data).is_some_and(|t| t.to_lowercase().contains("worsening")) {
            decision.needed = true;
            decision.nudge_text = Some(BP_NUDGE.to_string());
            decision.nudge_type = Some(NudgeType::ConcernFlag);
        }

        decision
    }

    pub fn metrics(&self, data: &HealthData) -> FollowUpMetrics {
        let activity_score = data.get("weekly_progress").map(|v| parse_progress(v) / 100.0);
        let sleep_score = sleep_quality(data).map(|q| q / 100.0);
        let bp_score = bp_trend(data).map(|t| match t {
            "improving" => 1.0,
            "stable" => 0.7,
            _ => 0.3,
        });
        let present: Vec<f64> = [activity_score, sleep_score, bp_score].into_iter().flatten().collect();
        let overall_score = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };
        FollowUpMetrics {
            activity_score,
            sleep_score,
            bp_score,
            overall_score,
        }
    }
}
