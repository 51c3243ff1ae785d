//! Static health data provider: one user's wearable metrics loaded from a JSON file or the
//! built-in sample, answered per intent.

use async_trait::async_trait;
use heartline_core::{HealthData, HealthDataProvider, Intent, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressureReading {
    pub systolic: u32,
    pub diastolic: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub latest: BloodPressureReading,
    /// "improving", "stable", or "worsening".
    pub trend: String,
    pub weekly_avg: BloodPressureReading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hrv {
    pub current: u32,
    pub weekly_avg: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub resting_avg: u32,
    pub active_avg: u32,
    pub hrv: Hrv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Steps {
    pub today: u64,
    pub weekly_total: u64,
    pub weekly_goal: u64,
    pub daily_avg: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepNight {
    pub hours: f64,
    pub quality_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub last_night: SleepNight,
    pub weekly_avg_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHealthData {
    pub user_id: String,
    pub blood_pressure: BloodPressure,
    pub heart_rate: HeartRate,
    pub steps: Steps,
    pub sleep: Sleep,
}

impl Default for UserHealthData {
    fn default() -> Self {
        Self {
            user_id: "user123".to_string(),
            blood_pressure: BloodPressure {
                latest: BloodPressureReading {
                    systolic: 128,
                    diastolic: 82,
                    timestamp: Some("2024-01-15T08:30:00Z".to_string()),
                },
                trend: "improving".to_string(),
                weekly_avg: BloodPressureReading {
                    systolic: 132,
                    diastolic: 85,
                    timestamp: None,
                },
            },
            heart_rate: HeartRate {
                resting_avg: 68,
                active_avg: 120,
                hrv: Hrv {
                    current: 45,
                    weekly_avg: 42,
                },
            },
            steps: Steps {
                today: 6500,
                weekly_total: 41000,
                weekly_goal: 49000,
                daily_avg: 5857,
            },
            sleep: Sleep {
                last_night: SleepNight {
                    hours: 7.2,
                    quality_score: 78,
                },
                weekly_avg_hours: 6.8,
            },
        }
    }
}

impl UserHealthData {
    /// Weekly step total as a percentage of the goal. Zero when no goal is set.
    pub fn weekly_progress(&self) -> f64 {
        if self.steps.weekly_goal == 0 {
            return 0.0;
        }
        self.steps.weekly_total as f64 / self.steps.weekly_goal as f64 * 100.0
    }

    /// Range problems in the dataset; empty when the data looks plausible.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let bp = &self.blood_pressure.latest;
        if bp.systolic > 300 {
            issues.push(format!("systolic out of range: {}", bp.systolic));
        }
        if bp.diastolic > 200 {
            issues.push(format!("diastolic out of range: {}", bp.diastolic));
        }
        for (name, v) in [
            ("resting heart rate", self.heart_rate.resting_avg),
            ("active heart rate", self.heart_rate.active_avg),
        ] {
            if v > 200 {
                issues.push(format!("{name} out of range: {v}"));
            }
        }
        if !(0.0..=24.0).contains(&self.sleep.last_night.hours) {
            issues.push(format!("sleep hours out of range: {}", self.sleep.last_night.hours));
        }
        if self.sleep.last_night.quality_score > 100 {
            issues.push(format!("sleep quality out of range: {}", self.sleep.last_night.quality_score));
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    BloodPressure,
    Steps,
    Sleep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric: Metric,
    pub trend: String,
    pub detail: String,
}

pub struct StaticHealthData {
    data: UserHealthData,
}

impl Default for StaticHealthData {
    fn default() -> Self {
        Self::new(UserHealthData::default())
    }
}

impl StaticHealthData {
    pub fn new(data: UserHealthData) -> Self {
        Self { data }
    }

    /// Loads a dataset from a JSON file. Out-of-range values are logged, not rejected.
    pub fn from_path(path: &Path) -> Result<Self, ProviderError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let data: UserHealthData = serde_json::from_str(&raw)?;
        let issues = data.validate();
        if !issues.is_empty() {
            tracing::warn!(path = %path.display(), ?issues, "health dataset has out-of-range values");
        }
        tracing::info!(user_id = %data.user_id, path = %path.display(), "health dataset loaded");
        Ok(Self::new(data))
    }

    /// File when given, built-in sample otherwise.
    pub fn from_optional_path(path: Option<&str>) -> Result<Self, ProviderError> {
        match path {
            Some(p) if !p.trim().is_empty() => Self::from_path(Path::new(p)),
            _ => Ok(Self::default()),
        }
    }

    pub fn data(&self) -> &UserHealthData {
        &self.data
    }

    pub fn trend_analysis(&self, metric: Metric) -> TrendAnalysis {
        let d = &self.data;
        match metric {
            Metric::BloodPressure => TrendAnalysis {
                metric,
                trend: d.blood_pressure.trend.clone(),
                detail: format!(
                    "latest {}/{} vs weekly average {}/{}",
                    d.blood_pressure.latest.systolic,
                    d.blood_pressure.latest.diastolic,
                    d.blood_pressure.weekly_avg.systolic,
                    d.blood_pressure.weekly_avg.diastolic
                ),
            },
            Metric::Steps => {
                let progress = d.weekly_progress();
                let trend = if progress >= 100.0 {
                    "goal_achieved"
                } else if progress >= 75.0 {
                    "on_track"
                } else {
                    "needs_improvement"
                };
                TrendAnalysis {
                    metric,
                    trend: trend.to_string(),
                    detail: format!("{progress:.1}% of weekly goal"),
                }
            }
            Metric::Sleep => {
                let last = d.sleep.last_night.hours;
                let avg = d.sleep.weekly_avg_hours;
                let trend = if last > avg {
                    "above_average"
                } else if last < avg {
                    "below_average"
                } else {
                    "steady"
                };
                TrendAnalysis {
                    metric,
                    trend: trend.to_string(),
                    detail: format!("{last} hours last night vs {avg} weekly average"),
                }
            }
        }
    }

    /// One-line, human-readable description of the data an intent would see.
    pub fn data_summary(&self, intent: Intent) -> String {
        let d = &self.data;
        match intent {
            Intent::BpMonitoring => format!(
                "Blood pressure {}/{} ({})",
                d.blood_pressure.latest.systolic, d.blood_pressure.latest.diastolic, d.blood_pressure.trend
            ),
            Intent::ActivityCheck => format!(
                "{} steps today, {:.1}% of weekly goal",
                d.steps.today,
                d.weekly_progress()
            ),
            Intent::SleepInquiry => format!(
                "{} hours of sleep, quality {}",
                d.sleep.last_night.hours, d.sleep.last_night.quality_score
            ),
            _ => format!(
                "Blood pressure {}/{}, {} steps today, sleep quality {}, HRV {}",
                d.blood_pressure.latest.systolic,
                d.blood_pressure.latest.diastolic,
                d.steps.today,
                d.sleep.last_night.quality_score,
                d.heart_rate.hrv.current
            ),
        }
    }

    fn select(&self, intent: Intent) -> Result<Value, ProviderError> {
        let d = &self.data;
        let value = match intent {
            Intent::BpMonitoring => json!({ "blood_pressure": serde_json::to_value(&d.blood_pressure)? }),
            Intent::ActivityCheck => json!({
                "steps": serde_json::to_value(&d.steps)?,
                "weekly_progress": format!("{:.1}%", d.weekly_progress()),
            }),
            Intent::SleepInquiry => json!({ "sleep": serde_json::to_value(&d.sleep)? }),
            _ => json!({
                "blood_pressure": serde_json::to_value(&d.blood_pressure.latest)?,
                "steps_today": d.steps.today,
                "sleep_quality": d.sleep.last_night.quality_score,
                "hrv": d.heart_rate.hrv.current,
            }),
        };
        Ok(value)
    }
}

#[async_trait]
impl HealthDataProvider for StaticHealthData {
    async fn fetch_health_data(&self, intent: Intent) -> Result<HealthData, ProviderError> {
        match self.select(intent)? {
            Value::Object(map) => Ok(map),
            other => Err(ProviderError::Data(format!("expected an object, got {other}"))),
        }
    }
}
