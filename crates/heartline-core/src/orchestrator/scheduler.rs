//! Proactive scheduling: decides whether a proposed nudge may surface now, and builds
//! reminder, follow-up, and celebration nudges. Never fails; "no nudge" is a valid outcome.

use crate::config::{PipelineConfig, MAX_NUDGE_COOLDOWN_HOURS};
use crate::shared::{ConversationState, NudgePriority, NudgeType, ProactiveNudge};
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of "now". Swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) in the user's local time.
    fn local_hour(&self) -> u32;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Clock frozen at one instant and local hour.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub hour: u32,
}

impl FixedClock {
    pub fn at_hour(hour: u32) -> Self {
        let now = Utc::now()
            .with_hour(hour)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or_else(Utc::now);
        Self { now, hour }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_hour(&self) -> u32 {
        self.hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

pub fn engagement_level(state: &ConversationState) -> EngagementLevel {
    match state.messages.len() {
        n if n > 10 => EngagementLevel::High,
        n if n > 5 => EngagementLevel::Medium,
        _ => EngagementLevel::Low,
    }
}

/// Accepted nudges per user, used for the daily cap and cooldown.
#[derive(Debug, Default)]
struct NudgeLedger {
    sent: DashMap<String, Vec<DateTime<Utc>>>,
}

impl NudgeLedger {
    /// Checks the daily cap and cooldown and records the nudge under one entry guard.
    /// Entries that can no longer affect either check are pruned.
    fn try_admit(&self, user_id: &str, now: DateTime<Utc>, max_daily: u32, cooldown: Duration) -> bool {
        let mut history = self.sent.entry(user_id.to_string()).or_default();
        let today = now.date_naive();
        history.retain(|t| t.date_naive() == today || now.signed_duration_since(*t) < cooldown);

        let sent_today = history.iter().filter(|t| t.date_naive() == today).count();
        if sent_today >= max_daily as usize {
            return false;
        }
        if let Some(last) = history.iter().max() {
            if now.signed_duration_since(*last) < cooldown {
                return false;
            }
        }
        history.push(now);
        true
    }
}

pub struct ProactiveScheduler {
    clock: Arc<dyn Clock>,
    window_start: u32,
    window_end: u32,
    max_daily_nudges: u32,
    cooldown: Duration,
    ledger: NudgeLedger,
}

impl ProactiveScheduler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &PipelineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            window_start: config.nudge_window_start,
            window_end: config.nudge_window_end,
            max_daily_nudges: config.max_daily_nudges,
            cooldown: Duration::hours(config.nudge_cooldown_hours.clamp(0, MAX_NUDGE_COOLDOWN_HOURS)),
            ledger: NudgeLedger::default(),
        }
    }

    /// Inclusive window check on a local hour.
    pub fn should_nudge(&self, hour: u32) -> bool {
        (self.window_start..=self.window_end).contains(&hour)
    }

    pub fn create_reminder(&self, user_id: &str, message: &str) -> ProactiveNudge {
        self.build(NudgeType::GentleReminder, message.to_string(), user_id, Duration::hours(1), NudgePriority::Normal)
    }

    pub fn create_follow_up(&self, user_id: &str, nudge_type: NudgeType, message: &str) -> ProactiveNudge {
        self.build(nudge_type, message.to_string(), user_id, Duration::hours(2), NudgePriority::Normal)
    }

    pub fn create_celebration(&self, user_id: &str, achievement: &str) -> ProactiveNudge {
        self.build(
            NudgeType::Celebration,
            format!("🎉 Congratulations! You've achieved: {achievement}"),
            user_id,
            Duration::zero(),
            NudgePriority::High,
        )
    }

    fn build(
        &self,
        nudge_type: NudgeType,
        message: String,
        user_id: &str,
        delay: Duration,
        priority: NudgePriority,
    ) -> ProactiveNudge {
        ProactiveNudge {
            nudge_type,
            message,
            scheduled_time: self.clock.now() + delay,
            target_user_id: user_id.to_string(),
            priority,
        }
    }

    /// Accepts a proposed follow-up when the hour window, daily cap, and cooldown all allow it.
    pub fn schedule(&self, user_id: &str, nudge_type: NudgeType, message: &str) -> Option<ProactiveNudge> {
        if !self.should_nudge(self.clock.local_hour()) {
            tracing::debug!(user_id, hour = self.clock.local_hour(), "nudge outside allowed window");
            return None;
        }
        let now = self.clock.now();
        if !self.ledger.try_admit(user_id, now, self.max_daily_nudges, self.cooldown) {
            tracing::debug!(user_id, "nudge suppressed by daily cap or cooldown");
            return None;
        }
        Some(self.create_follow_up(user_id, nudge_type, message))
    }
}
