//! Sequential executor: the same stages as the graph, called directly in order. No checkpoints.

use super::stages::{route_after_intent, PipelineAgents, Stage};
use super::TurnExecutor;
use crate::config::ExecutionMode;
use crate::error::PipelineResult;
use crate::shared::{ConversationState, TurnContext};
use async_trait::async_trait;
use std::sync::Arc;

pub struct SequentialExecutor {
    agents: Arc<PipelineAgents>,
}

impl SequentialExecutor {
    pub fn new(agents: Arc<PipelineAgents>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl TurnExecutor for SequentialExecutor {
    async fn run_turn(&self, ctx: &TurnContext, utterance: &str) -> PipelineResult<ConversationState> {
        let mut state = ConversationState::from_utterance(utterance);
        let agents = &self.agents;

        agents.run_stage(Stage::IntentClassification, &mut state, ctx).await?;
        match route_after_intent(state.current_intent) {
            Stage::KnowledgeRetrieval => agents.run_stage(Stage::KnowledgeRetrieval, &mut state, ctx).await?,
            Stage::DataRetrieval => agents.run_stage(Stage::DataRetrieval, &mut state, ctx).await?,
            _ => {}
        }
        for stage in [
            Stage::ResponseComposition,
            Stage::SafetyGate,
            Stage::FollowUpEvaluation,
            Stage::ProactiveScheduling,
        ] {
            agents.run_stage(stage, &mut state, ctx).await?;
        }
        Ok(state)
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sequential
    }
}
