//! heartline-core: conversational health assistant core (shared state, intent routing,
//! response templates, safety gate, follow-up nudges, and the turn pipeline).
//!
//! Concrete data and knowledge providers live in `heartline-skills`; the HTTP surface lives in
//! the `heartline-gateway` add-on.

mod config;
mod error;
mod knowledge;
mod memory;
pub mod orchestrator;
pub mod security;
mod shared;

pub use config::{ExecutionMode, PipelineConfig, MAX_NUDGE_COOLDOWN_HOURS};
pub use error::{CheckpointError, PipelineError, PipelineResult, ProviderError};
pub use knowledge::{
    format_knowledge_context, HealthData, HealthDataProvider, KnowledgeProvider, KnowledgeSnippet, NoHealthData,
    NoKnowledge,
};
pub use memory::{Checkpoint, ConversationStore, MemoryCheckpointStore, SledCheckpointStore};
pub use shared::{
    ConversationPhase, ConversationState, Intent, Message, MessagePriority, NudgePriority, NudgeType,
    ProactiveNudge, Role, SafetyFlag, TurnContext, DEFAULT_THREAD_ID, MAX_MESSAGE_CHARS,
};

pub use orchestrator::{
    engagement_level, route_after_intent, Classification, Clock, EngagementLevel, FixedClock, FollowUpDecision,
    FollowUpEvaluator, FollowUpMetrics, GraphExecutor, IntentClassifier, KeywordIntentClassifier, Orchestrator,
    PipelineAgents, PipelineGraph, PipelineStatus, ProactiveScheduler, ResponseComposer, SequentialExecutor,
    Stage, SystemClock, TemplateComposer, TurnExecutor, TurnOutcome, APOLOGY, EMERGENCY_RESPONSE, EMPTY_PROMPT,
    MEDICAL_REFUSAL, SYNC_FALLBACK, TOO_LONG_PROMPT,
};
pub use security::{
    risk_level, safety_report, safety_score, should_block, validate_emergency_response, PatternSafetyGate,
    RiskLevel, SafetyReport, SafetyValidator, SafetyVerdict, DISCLAIMER, SAFE_FALLBACK,
};
