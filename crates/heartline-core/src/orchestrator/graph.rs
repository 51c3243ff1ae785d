//! Graph executor: stages as nodes, direct and conditional edges, one checkpoint per finished
//! stage keyed by thread id.

use super::stages::{route_after_intent, PipelineAgents, Stage};
use super::TurnExecutor;
use crate::config::ExecutionMode;
use crate::error::PipelineResult;
use crate::memory::{Checkpoint, ConversationStore};
use crate::shared::{ConversationState, Message, MessagePriority, TurnContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outgoing edge of a node.
#[derive(Clone, Copy)]
pub enum Edge {
    Direct(Stage),
    /// Target chosen from the state after the node ran.
    Conditional(fn(&ConversationState) -> Stage),
    End,
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(s) => write!(f, "Direct({s})"),
            Edge::Conditional(_) => f.write_str("Conditional"),
            Edge::End => f.write_str("End"),
        }
    }
}

fn route_state(state: &ConversationState) -> Stage {
    route_after_intent(state.current_intent)
}

#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub entry: Stage,
    edges: BTreeMap<Stage, Edge>,
}

impl PipelineGraph {
    /// Classification, one conditional branch into retrieval, then the linear tail.
    pub fn standard() -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(Stage::IntentClassification, Edge::Conditional(route_state));
        edges.insert(Stage::KnowledgeRetrieval, Edge::Direct(Stage::ResponseComposition));
        edges.insert(Stage::DataRetrieval, Edge::Direct(Stage::ResponseComposition));
        edges.insert(Stage::ResponseComposition, Edge::Direct(Stage::SafetyGate));
        edges.insert(Stage::SafetyGate, Edge::Direct(Stage::FollowUpEvaluation));
        edges.insert(Stage::FollowUpEvaluation, Edge::Direct(Stage::ProactiveScheduling));
        edges.insert(Stage::ProactiveScheduling, Edge::End);
        Self {
            entry: Stage::IntentClassification,
            edges,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = Stage> + '_ {
        self.edges.keys().copied()
    }

    pub fn next(&self, from: Stage, state: &ConversationState) -> Option<Stage> {
        match self.edges.get(&from)? {
            Edge::Direct(to) => Some(*to),
            Edge::Conditional(pick) => Some(pick(state)),
            Edge::End => None,
        }
    }

    /// Every stage must be a node and every direct edge must land on a node.
    pub fn validate(&self) -> Result<(), String> {
        for stage in Stage::ALL {
            if !self.edges.contains_key(&stage) {
                return Err(format!("stage {stage} has no node"));
            }
        }
        for (from, edge) in &self.edges {
            if let Edge::Direct(to) = edge {
                if !self.edges.contains_key(to) {
                    return Err(format!("edge {from} -> {to} targets a missing node"));
                }
            }
        }
        if !self.edges.values().any(|e| matches!(e, Edge::End)) {
            return Err("graph has no terminal edge".to_string());
        }
        Ok(())
    }
}

pub struct GraphExecutor {
    agents: Arc<PipelineAgents>,
    store: Arc<dyn ConversationStore>,
    graph: PipelineGraph,
}

impl GraphExecutor {
    pub fn new(agents: Arc<PipelineAgents>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            agents,
            store,
            graph: PipelineGraph::standard(),
        }
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Walks the graph from `start`, persisting a checkpoint after each stage.
    async fn drive(
        &self,
        ctx: &TurnContext,
        mut state: ConversationState,
        start: Stage,
        mut step: u32,
    ) -> PipelineResult<ConversationState> {
        let thread_id = ctx.resolved_thread_id();
        let mut current = Some(start);
        while let Some(stage) = current {
            self.agents.run_stage(stage, &mut state, ctx).await?;
            step += 1;
            current = self.graph.next(stage, &state);
            let checkpoint = Checkpoint::new(thread_id, state.clone(), current, step);
            self.store.persist_conversation(thread_id, &checkpoint)?;
        }
        Ok(state)
    }

    /// Continues an interrupted turn from its saved `next_stage`. `None` when nothing is pending.
    pub async fn resume(&self, ctx: &TurnContext) -> PipelineResult<Option<ConversationState>> {
        let thread_id = ctx.resolved_thread_id();
        let Some(checkpoint) = self.store.load_conversation(thread_id)? else {
            return Ok(None);
        };
        let Some(next) = checkpoint.next_stage else {
            return Ok(None);
        };
        tracing::info!(thread_id, next_stage = %next, step = checkpoint.step, "resuming checkpoint");
        let state = self.drive(ctx, checkpoint.state, next, checkpoint.step).await?;
        Ok(Some(state))
    }

    /// Records a failed turn as a completed checkpoint so the thread's history stays coherent.
    fn record_failure(&self, thread_id: &str, history: Vec<Message>, utterance: &str, reply: &str) {
        let mut state = ConversationState::with_history(history, utterance);
        state.push(Message::assistant(reply).with_priority(MessagePriority::Error));
        let checkpoint = Checkpoint::new(thread_id, state, None, 0);
        if let Err(e) = self.store.persist_conversation(thread_id, &checkpoint) {
            tracing::warn!(thread_id, error = %e, "failed to record failed turn");
        }
    }
}

#[async_trait]
impl TurnExecutor for GraphExecutor {
    async fn run_turn(&self, ctx: &TurnContext, utterance: &str) -> PipelineResult<ConversationState> {
        let thread_id = ctx.resolved_thread_id();
        let history = self
            .store
            .load_conversation(thread_id)?
            .map(|c| c.state.messages)
            .unwrap_or_default();
        let state = ConversationState::with_history(history.clone(), utterance);
        match self.drive(ctx, state, self.graph.entry, 0).await {
            Ok(state) => Ok(state),
            Err(e) => {
                self.record_failure(thread_id, history, utterance, super::APOLOGY);
                Err(e)
            }
        }
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Graph
    }
}
