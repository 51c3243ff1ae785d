//! Shared types threaded through every pipeline stage: messages, intents, safety flags,
//! nudges, and the per-turn [`ConversationState`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on message content, in characters. Longer content is truncated on append.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Thread id used when a caller does not supply one.
pub const DEFAULT_THREAD_ID: &str = "default";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Optional delivery priority attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Normal,
    High,
    Error,
}

fn clamp_content(content: String) -> String {
    match content.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<MessagePriority>,
}

impl Message {
    /// Builds a message stamped now. Content longer than [`MAX_MESSAGE_CHARS`] is truncated.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: clamp_content(content.into()),
            timestamp: Utc::now(),
            priority: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Replaces the content, keeping the length bound.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = clamp_content(content.into());
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Category assigned to an utterance by the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Emergency,
    MedicalAdvice,
    KnowledgeQuery,
    ActivityCheck,
    SleepInquiry,
    BpMonitoring,
    HealthQuery,
    OffTopic,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::Emergency,
        Intent::MedicalAdvice,
        Intent::KnowledgeQuery,
        Intent::ActivityCheck,
        Intent::SleepInquiry,
        Intent::BpMonitoring,
        Intent::HealthQuery,
        Intent::OffTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Emergency => "EMERGENCY",
            Intent::MedicalAdvice => "MEDICAL_ADVICE",
            Intent::KnowledgeQuery => "KNOWLEDGE_QUERY",
            Intent::ActivityCheck => "ACTIVITY_CHECK",
            Intent::SleepInquiry => "SLEEP_INQUIRY",
            Intent::BpMonitoring => "BP_MONITORING",
            Intent::HealthQuery => "HEALTH_QUERY",
            Intent::OffTopic => "OFF_TOPIC",
        }
    }

    /// Intents that must always carry the medical disclaimer.
    pub fn requires_disclaimer(&self) -> bool {
        matches!(self, Intent::Emergency | Intent::MedicalAdvice)
    }

    /// Intents answered from the user's own metrics.
    pub fn is_personal_data(&self) -> bool {
        matches!(
            self,
            Intent::BpMonitoring | Intent::ActivityCheck | Intent::SleepInquiry | Intent::HealthQuery
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Greeting,
    Assessment,
    Advice,
    FollowUp,
    Emergency,
}

/// Signals raised by the safety gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyFlag {
    UnsafeContent,
    MedicalAdviceDetected,
    NeedsDisclaimer,
    EmergencyVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NudgeType {
    GentleReminder,
    GoalCheck,
    ConcernFlag,
    Celebration,
    Education,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgePriority {
    #[default]
    Normal,
    High,
}

/// A nudge the scheduler has accepted for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveNudge {
    pub nudge_type: NudgeType,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub target_user_id: String,
    pub priority: NudgePriority,
}

/// Per-call identity: which conversation thread and which user a turn belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnContext {
    /// Conversation thread. When empty, [`DEFAULT_THREAD_ID`] is used.
    pub thread_id: String,
    pub user_id: String,
    /// Optional correlation id for request tracing.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl TurnContext {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            correlation_id: None,
        }
    }

    /// Resolved thread id (never empty).
    pub fn resolved_thread_id(&self) -> &str {
        let trimmed = self.thread_id.trim();
        if trimmed.is_empty() {
            DEFAULT_THREAD_ID
        } else {
            trimmed
        }
    }
}

/// The mutable record every stage reads and writes during one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub retrieved_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub current_intent: Option<Intent>,
    #[serde(default)]
    pub requires_disclaimer: bool,
    #[serde(default)]
    pub conversation_phase: ConversationPhase,
    #[serde(default)]
    pub follow_up_needed: bool,
    #[serde(default)]
    pub safety_flags: BTreeSet<SafetyFlag>,
    #[serde(default)]
    pub proactive_nudge: Option<String>,
    /// Kind of the proposed nudge, set alongside `proactive_nudge`.
    #[serde(default)]
    pub nudge_type: Option<NudgeType>,
    #[serde(default)]
    pub scheduled_nudge: Option<ProactiveNudge>,
}

impl ConversationState {
    /// Fresh state for a single utterance.
    pub fn from_utterance(utterance: &str) -> Self {
        Self::with_history(Vec::new(), utterance)
    }

    /// State for a new turn that carries earlier messages. Turn-scoped fields start empty.
    pub fn with_history(mut history: Vec<Message>, utterance: &str) -> Self {
        history.push(Message::user(utterance));
        Self {
            messages: history,
            ..Self::default()
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Latest user utterance, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// The reply the turn produced: the last assistant message.
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    pub fn has_flag(&self, flag: SafetyFlag) -> bool {
        self.safety_flags.contains(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_content_is_truncated_to_limit() {
        let long = "a".repeat(MAX_MESSAGE_CHARS + 50);
        let msg = Message::user(long);
        assert_eq!(msg.content.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn set_content_keeps_the_limit() {
        let mut msg = Message::assistant("short");
        msg.set_content(format!("{}{}", "é".repeat(MAX_MESSAGE_CHARS - 3), " tail text"));
        assert_eq!(msg.content.chars().count(), MAX_MESSAGE_CHARS);
        assert!(msg.content.ends_with(" ta"));
        msg.set_content("fits");
        assert_eq!(msg.content, "fits");
    }

    #[test]
    fn intent_serializes_screaming_snake() {
        let s = serde_json::to_string(&Intent::BpMonitoring).unwrap();
        assert_eq!(s, "\"BP_MONITORING\"");
        assert_eq!(Intent::KnowledgeQuery.to_string(), "KNOWLEDGE_QUERY");
    }

    #[test]
    fn disclaimer_intents() {
        for intent in Intent::ALL {
            let expected = matches!(intent, Intent::Emergency | Intent::MedicalAdvice);
            assert_eq!(intent.requires_disclaimer(), expected, "{intent}");
        }
    }

    #[test]
    fn with_history_resets_turn_fields() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let state = ConversationState::with_history(history, "how did I sleep?");
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.last_user_message().unwrap().content, "how did I sleep?");
        assert_eq!(state.last_assistant_message().unwrap().content, "hello");
        assert!(state.current_intent.is_none());
        assert!(state.safety_flags.is_empty());
        assert!(state.retrieved_data.is_empty());
    }

    #[test]
    fn turn_context_resolves_default_thread() {
        assert_eq!(TurnContext::new("", "u").resolved_thread_id(), DEFAULT_THREAD_ID);
        assert_eq!(TurnContext::new(" t-1 ", "u").resolved_thread_id(), "t-1");
    }
}
