//! Turn pipeline: classification, retrieval, composition, safety gate, follow-up, and nudge
//! scheduling, driven by either the checkpointed graph executor or the sequential executor.
//!
//! [`Orchestrator::process_message`] never fails. Any stage error is logged with its stage and
//! thread id, the in-flight state is dropped, and the caller receives [`APOLOGY`].

pub mod composer;
pub mod followup;
mod graph;
pub mod intent;
pub mod scheduler;
mod sequential;
mod stages;

pub use composer::{
    response_metrics, ResponseComposer, ResponseMetrics, TemplateComposer, EMERGENCY_RESPONSE, MEDICAL_REFUSAL,
    SYNC_FALLBACK,
};
pub use followup::{FollowUpDecision, FollowUpEvaluator, FollowUpMetrics};
pub use graph::{Edge, GraphExecutor, PipelineGraph};
pub use intent::{Classification, IntentClassifier, KeywordIntentClassifier};
pub use scheduler::{engagement_level, Clock, EngagementLevel, FixedClock, ProactiveScheduler, SystemClock};
pub use sequential::SequentialExecutor;
pub use stages::{route_after_intent, PipelineAgents, Stage};

use crate::config::{ExecutionMode, PipelineConfig};
use crate::error::PipelineResult;
use crate::memory::ConversationStore;
use crate::shared::{ConversationState, Message, MessagePriority, TurnContext, MAX_MESSAGE_CHARS};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Delivered whenever a stage fails.
pub const APOLOGY: &str =
    "I'm sorry, I encountered an error while processing your message. Please try again.";

/// Delivered for blank input; the pipeline does not run.
/// Returned for utterances longer than [`MAX_MESSAGE_CHARS`]; the pipeline does not run.
pub const TOO_LONG_PROMPT: &str = "Your message is too long. Please keep it under 5000 characters. \
If this is an emergency, call 911 or your local emergency number immediately.";

pub const EMPTY_PROMPT: &str =
    "I'm here to help! Ask me about your steps, your sleep, or your blood pressure readings.";

/// One strategy for driving a turn through the stages.
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    async fn run_turn(&self, ctx: &TurnContext, utterance: &str) -> PipelineResult<ConversationState>;

    fn mode(&self) -> ExecutionMode;
}

/// Reply plus the final state of the turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub state: ConversationState,
    /// True when the turn ended in [`APOLOGY`].
    pub failed: bool,
    pub failed_stage: Option<Stage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub execution_mode: ExecutionMode,
    pub agents_initialized: BTreeMap<Stage, bool>,
    pub provider_available: bool,
    pub health_data_available: bool,
    pub knowledge_available: bool,
    pub graph_valid: bool,
    pub turns_processed: u64,
    pub turns_failed: u64,
    /// Threads with a turn running or queued.
    pub active_threads: usize,
}

pub struct Orchestrator {
    agents: Arc<PipelineAgents>,
    executor: Arc<dyn TurnExecutor>,
    /// Present in graph mode; used for resume.
    graph: Option<Arc<GraphExecutor>>,
    default_user_id: String,
    /// Serializes turns that share a thread id.
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
    turns_processed: AtomicU64,
    turns_failed: AtomicU64,
}

impl Orchestrator {
    /// Builds the executor named by `config.execution_mode`.
    pub fn new(config: &PipelineConfig, agents: PipelineAgents, store: Arc<dyn ConversationStore>) -> Self {
        Self::with_mode(config.execution_mode, &config.default_user_id, agents, store)
    }

    pub fn with_mode(
        mode: ExecutionMode,
        default_user_id: &str,
        agents: PipelineAgents,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let agents = Arc::new(agents);
        let (executor, graph): (Arc<dyn TurnExecutor>, Option<Arc<GraphExecutor>>) = match mode {
            ExecutionMode::Graph => {
                let g = Arc::new(GraphExecutor::new(Arc::clone(&agents), store));
                (g.clone() as Arc<dyn TurnExecutor>, Some(g))
            }
            ExecutionMode::Sequential => (
                Arc::new(SequentialExecutor::new(Arc::clone(&agents))) as Arc<dyn TurnExecutor>,
                None,
            ),
        };
        tracing::info!(execution_mode = %mode, "pipeline orchestrator ready");
        Self {
            agents,
            executor,
            graph,
            default_user_id: default_user_id.to_string(),
            thread_locks: DashMap::new(),
            turns_processed: AtomicU64::new(0),
            turns_failed: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.executor.mode()
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn context_for(&self, thread_id: &str) -> TurnContext {
        let mut ctx = TurnContext::new(thread_id, self.default_user_id.clone());
        ctx.correlation_id = Some(uuid::Uuid::new_v4().to_string());
        ctx
    }

    /// Runs one turn and returns only the reply text.
    pub async fn process_message(&self, utterance: &str, thread_id: &str) -> String {
        let ctx = self.context_for(thread_id);
        self.process_turn(&ctx, utterance).await.reply
    }

    fn short_circuit(reply: &str) -> TurnOutcome {
        let mut state = ConversationState::default();
        state.push(Message::assistant(reply));
        TurnOutcome {
            reply: reply.to_string(),
            state,
            failed: false,
            failed_stage: None,
        }
    }

    /// Drops the thread's lock entry once no turn holds or awaits it.
    fn release_thread_lock(&self, thread_id: &str) {
        self.thread_locks.remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Runs one turn. Never fails: stage errors become [`APOLOGY`].
    /// Blank and over-length utterances get a fixed reply without running the pipeline.
    pub async fn process_turn(&self, ctx: &TurnContext, utterance: &str) -> TurnOutcome {
        if utterance.trim().is_empty() {
            return Self::short_circuit(EMPTY_PROMPT);
        }
        if utterance.chars().count() > MAX_MESSAGE_CHARS {
            tracing::warn!(
                thread_id = %ctx.resolved_thread_id(),
                chars = utterance.chars().count(),
                "utterance over length limit"
            );
            return Self::short_circuit(TOO_LONG_PROMPT);
        }

        let thread_id = ctx.resolved_thread_id().to_string();
        let lock = self.thread_lock(&thread_id);
        let guard = lock.lock().await;
        let outcome = self.run_locked(ctx, utterance, &thread_id).await;
        drop(guard);
        drop(lock);
        self.release_thread_lock(&thread_id);
        outcome
    }

    async fn run_locked(&self, ctx: &TurnContext, utterance: &str, thread_id: &str) -> TurnOutcome {
        self.turns_processed.fetch_add(1, Ordering::Relaxed);
        match self.executor.run_turn(ctx, utterance).await {
            Ok(state) => {
                let reply = match state.last_assistant_message() {
                    Some(m) => m.content.clone(),
                    None => APOLOGY.to_string(),
                };
                tracing::info!(
                    thread_id = %thread_id,
                    correlation_id = ?ctx.correlation_id,
                    intent = ?state.current_intent,
                    flags = ?state.safety_flags,
                    follow_up = state.follow_up_needed,
                    "turn complete"
                );
                TurnOutcome {
                    reply,
                    state,
                    failed: false,
                    failed_stage: None,
                }
            }
            Err(e) => {
                self.turns_failed.fetch_add(1, Ordering::Relaxed);
                let stage = e.stage();
                tracing::error!(
                    thread_id = %thread_id,
                    correlation_id = ?ctx.correlation_id,
                    stage = stage.map(|s| s.as_str()).unwrap_or("checkpoint"),
                    error = %e,
                    "pipeline stage failed"
                );
                let mut state = ConversationState::from_utterance(utterance);
                state.push(Message::assistant(APOLOGY).with_priority(MessagePriority::Error));
                TurnOutcome {
                    reply: APOLOGY.to_string(),
                    state,
                    failed: true,
                    failed_stage: stage,
                }
            }
        }
    }

    /// Finishes an interrupted graph turn. `None` in sequential mode or when nothing is pending.
    pub async fn resume(&self, thread_id: &str) -> Option<String> {
        let graph = self.graph.as_ref()?;
        let ctx = self.context_for(thread_id);
        let lock = self.thread_lock(ctx.resolved_thread_id());
        let guard = lock.lock().await;
        let result = graph.resume(&ctx).await;
        drop(guard);
        drop(lock);
        self.release_thread_lock(ctx.resolved_thread_id());
        match result {
            Ok(Some(state)) => Some(
                state
                    .last_assistant_message()
                    .map(|m| m.content.clone())
                    .unwrap_or_else(|| APOLOGY.to_string()),
            ),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(thread_id, stage = ?e.stage(), error = %e, "resume failed");
                Some(APOLOGY.to_string())
            }
        }
    }

    pub fn get_status(&self) -> PipelineStatus {
        let agents_initialized = Stage::ALL.iter().map(|s| (*s, true)).collect();
        let health_data_available = self.agents.health_data.is_available();
        let knowledge_available = self.agents.knowledge.is_available();
        let graph_valid = match &self.graph {
            Some(g) => g.graph().validate().is_ok(),
            None => true,
        };
        PipelineStatus {
            execution_mode: self.mode(),
            agents_initialized,
            provider_available: self.agents.providers_available(),
            health_data_available,
            knowledge_available,
            graph_valid,
            turns_processed: self.turns_processed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            active_threads: self.thread_locks.len(),
        }
    }
}
