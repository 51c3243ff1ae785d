//! The closed set of pipeline stages and the collaborators that run them.
//!
//! Both executors call [`PipelineAgents::run_stage`]; the only thing that differs between them
//! is how the next stage is chosen.

use super::composer::{ResponseComposer, TemplateComposer};
use super::followup::FollowUpEvaluator;
use super::intent::{IntentClassifier, KeywordIntentClassifier};
use super::scheduler::ProactiveScheduler;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::knowledge::{format_knowledge_context, HealthDataProvider, KnowledgeProvider};
use crate::security::{should_block, PatternSafetyGate, SafetyValidator, SAFE_FALLBACK};
use crate::shared::{ConversationState, Intent, Message, MessagePriority, NudgeType, TurnContext};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentClassification,
    KnowledgeRetrieval,
    DataRetrieval,
    ResponseComposition,
    SafetyGate,
    FollowUpEvaluation,
    ProactiveScheduling,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::IntentClassification,
        Stage::KnowledgeRetrieval,
        Stage::DataRetrieval,
        Stage::ResponseComposition,
        Stage::SafetyGate,
        Stage::FollowUpEvaluation,
        Stage::ProactiveScheduling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntentClassification => "intent_classification",
            Stage::KnowledgeRetrieval => "knowledge_retrieval",
            Stage::DataRetrieval => "data_retrieval",
            Stage::ResponseComposition => "response_composition",
            Stage::SafetyGate => "safety_gate",
            Stage::FollowUpEvaluation => "follow_up_evaluation",
            Stage::ProactiveScheduling => "proactive_scheduling",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch taken once after classification.
pub fn route_after_intent(intent: Option<Intent>) -> Stage {
    match intent {
        Some(Intent::KnowledgeQuery) => Stage::KnowledgeRetrieval,
        Some(i) if i.is_personal_data() => Stage::DataRetrieval,
        _ => Stage::ResponseComposition,
    }
}

/// Everything a stage needs. Shared by both executors.
pub struct PipelineAgents {
    pub classifier: Arc<dyn IntentClassifier>,
    pub health_data: Arc<dyn HealthDataProvider>,
    pub knowledge: Arc<dyn KnowledgeProvider>,
    pub composer: Arc<dyn ResponseComposer>,
    pub safety: Arc<dyn SafetyValidator>,
    pub follow_up: FollowUpEvaluator,
    pub scheduler: ProactiveScheduler,
    pub knowledge_top_k: usize,
    pub provider_attempts: u32,
}

impl PipelineAgents {
    /// Default strategies (keyword classifier, templates, pattern gate) around the given providers.
    pub fn new(
        config: &PipelineConfig,
        health_data: Arc<dyn HealthDataProvider>,
        knowledge: Arc<dyn KnowledgeProvider>,
    ) -> Self {
        Self {
            classifier: Arc::new(KeywordIntentClassifier::new()),
            health_data,
            knowledge,
            composer: Arc::new(TemplateComposer::new()),
            safety: Arc::new(PatternSafetyGate::new()),
            follow_up: FollowUpEvaluator::new(),
            scheduler: ProactiveScheduler::new(config),
            knowledge_top_k: config.knowledge_top_k.max(1),
            provider_attempts: config.provider_attempts.max(1),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_composer(mut self, composer: Arc<dyn ResponseComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_safety(mut self, safety: Arc<dyn SafetyValidator>) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_scheduler(mut self, scheduler: ProactiveScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn providers_available(&self) -> bool {
        self.health_data.is_available() && self.knowledge.is_available()
    }

    /// Runs one stage against the state in place.
    pub async fn run_stage(
        &self,
        stage: Stage,
        state: &mut ConversationState,
        ctx: &TurnContext,
    ) -> PipelineResult<()> {
        tracing::debug!(stage = %stage, thread_id = %ctx.resolved_thread_id(), "running stage");
        match stage {
            Stage::IntentClassification => self.classify(state).await,
            Stage::KnowledgeRetrieval => self.retrieve_knowledge(state).await,
            Stage::DataRetrieval => self.retrieve_data(state).await,
            Stage::ResponseComposition => self.compose(state).await,
            Stage::SafetyGate => self.gate(state, ctx).await,
            Stage::FollowUpEvaluation => {
                self.evaluate_follow_up(state);
                Ok(())
            }
            Stage::ProactiveScheduling => {
                self.schedule_nudge(state, ctx);
                Ok(())
            }
        }
    }

    async fn classify(&self, state: &mut ConversationState) -> PipelineResult<()> {
        let utterance = state.last_user_message().map(|m| m.content.clone()).unwrap_or_default();
        let c = self.classifier.classify(&utterance).await;
        state.current_intent = Some(c.intent);
        state.requires_disclaimer = c.requires_disclaimer || c.intent.requires_disclaimer();
        state.conversation_phase = c.phase;
        tracing::info!(intent = %c.intent, requires_disclaimer = state.requires_disclaimer, "intent classified");
        Ok(())
    }

    async fn with_retries<T, F, Fut>(&self, stage: Stage, mut call: F) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.provider_attempts => {
                    tracing::warn!(stage = %stage, attempt, error = %e, "provider call failed, retrying");
                    attempt += 1;
                }
                Err(source) => return Err(PipelineError::Provider { stage, source }),
            }
        }
    }

    async fn retrieve_knowledge(&self, state: &mut ConversationState) -> PipelineResult<()> {
        let query = state.last_user_message().map(|m| m.content.clone()).unwrap_or_default();
        let k = self.knowledge_top_k;
        let mut snippets = self
            .with_retries(Stage::KnowledgeRetrieval, || self.knowledge.fetch_knowledge(&query, k))
            .await?;
        snippets.truncate(k);
        if snippets.is_empty() {
            return Ok(());
        }
        let value = serde_json::to_value(&snippets).map_err(|e| PipelineError::Stage {
            stage: Stage::KnowledgeRetrieval,
            message: e.to_string(),
        })?;
        state.retrieved_data.insert("knowledge".to_string(), value);
        state.push(Message::system(format_knowledge_context(&snippets)));
        tracing::debug!(snippets = snippets.len(), "knowledge attached");
        Ok(())
    }

    async fn retrieve_data(&self, state: &mut ConversationState) -> PipelineResult<()> {
        let intent = state.current_intent.unwrap_or(Intent::HealthQuery);
        let data = self
            .with_retries(Stage::DataRetrieval, || self.health_data.fetch_health_data(intent))
            .await?;
        tracing::debug!(keys = data.len(), "health data retrieved");
        state.retrieved_data.extend(data);
        Ok(())
    }

    async fn compose(&self, state: &mut ConversationState) -> PipelineResult<()> {
        let intent = state.current_intent.unwrap_or(Intent::HealthQuery);
        let reply = self.composer.compose(intent, &state.retrieved_data).await?;
        let mut message = Message::assistant(reply);
        if intent == Intent::Emergency {
            message = message.with_priority(MessagePriority::High);
        }
        state.push(message);
        Ok(())
    }

    async fn gate(&self, state: &mut ConversationState, ctx: &TurnContext) -> PipelineResult<()> {
        let verdict = self.safety.evaluate(state).await;
        state.safety_flags.extend(verdict.flags.iter().copied());
        let blocked = should_block(&state.safety_flags);
        if !state.safety_flags.is_empty() {
            tracing::warn!(
                thread_id = %ctx.resolved_thread_id(),
                flags = ?state.safety_flags,
                blocked,
                "safety flags raised"
            );
        }
        let Some(last) = state.messages.last_mut() else {
            return Ok(());
        };
        last.set_content(if blocked { SAFE_FALLBACK.to_string() } else { verdict.content });
        Ok(())
    }

    fn evaluate_follow_up(&self, state: &mut ConversationState) {
        let decision = self.follow_up.evaluate(&state.retrieved_data);
        state.follow_up_needed = decision.needed;
        state.proactive_nudge = decision.nudge_text;
        state.nudge_type = decision.nudge_type;
    }

    fn schedule_nudge(&self, state: &mut ConversationState, ctx: &TurnContext) {
        state.scheduled_nudge = None;
        if !state.follow_up_needed {
            return;
        }
        let Some(text) = state.proactive_nudge.as_deref() else {
            return;
        };
        let kind = state.nudge_type.unwrap_or(NudgeType::GentleReminder);
        state.scheduled_nudge = self.scheduler.schedule(&ctx.user_id, kind, text);
    }
}
