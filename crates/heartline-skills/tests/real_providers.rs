//! Full pipeline turns against the static dataset and the seeded snippet store.

use heartline_core::{
    ConversationStore, ExecutionMode, FixedClock, Intent, MemoryCheckpointStore, Orchestrator, PipelineAgents,
    PipelineConfig, ProactiveScheduler, TurnContext,
};
use heartline_skills::{SnippetStore, StaticHealthData, UserHealthData};
use std::sync::Arc;

const MODES: [ExecutionMode; 2] = [ExecutionMode::Graph, ExecutionMode::Sequential];

fn orchestrator(
    mode: ExecutionMode,
    data: UserHealthData,
    knowledge: Arc<SnippetStore>,
) -> Orchestrator {
    let cfg = PipelineConfig::default();
    let agents = PipelineAgents::new(&cfg, Arc::new(StaticHealthData::new(data)), knowledge)
        .with_scheduler(ProactiveScheduler::with_clock(&cfg, Arc::new(FixedClock::at_hour(10))));
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryCheckpointStore::new());
    Orchestrator::with_mode(mode, "user123", agents, store)
}

fn seeded_store() -> (tempfile::TempDir, Arc<SnippetStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SnippetStore::open_seeded(dir.path()).unwrap());
    (dir, store)
}

#[tokio::test]
async fn sample_dataset_answers_each_metric() {
    let (_dir, knowledge) = seeded_store();
    for mode in MODES {
        let orch = orchestrator(mode, UserHealthData::default(), knowledge.clone());
        let ctx = TurnContext::new("t", "user123");

        let sleep = orch.process_turn(&ctx, "How did I sleep last night?").await;
        assert!(sleep.reply.contains("7.2"), "{mode}: {}", sleep.reply);
        assert!(sleep.reply.contains("78"));
        assert!(!sleep.state.follow_up_needed);

        let steps = orch.process_turn(&ctx, "How many steps did I take this week?").await;
        assert!(steps.reply.contains("6,500"));
        assert!(steps.reply.contains("83.7%"));
        assert!(!steps.state.follow_up_needed);

        let bp = orch.process_turn(&ctx, "What's my blood pressure?").await;
        assert!(bp.reply.contains("128/82"));
        assert!(bp.reply.contains("improving"));
    }
}

#[tokio::test]
async fn knowledge_question_cites_library_source() {
    let (_dir, knowledge) = seeded_store();
    for mode in MODES {
        let orch = orchestrator(mode, UserHealthData::default(), knowledge.clone());
        let out = orch.process_turn(&TurnContext::new("t", "user123"), "What is HRV?").await;
        assert_eq!(out.state.current_intent, Some(Intent::KnowledgeQuery), "{mode}");
        assert!(out.reply.contains("Cardiology Research"));
        assert!(out
            .state
            .messages
            .iter()
            .any(|m| m.content.starts_with("Knowledge Context:") && m.content.contains("Topic: hrv")));
    }
}

#[tokio::test]
async fn poor_sleep_in_dataset_triggers_nudge() {
    let (_dir, knowledge) = seeded_store();
    let mut data = UserHealthData::default();
    data.sleep.last_night.quality_score = 45;
    for mode in MODES {
        let orch = orchestrator(mode, data.clone(), knowledge.clone());
        let out = orch
            .process_turn(&TurnContext::new("t", "user123"), "How did I sleep last night?")
            .await;
        assert!(out.state.follow_up_needed, "{mode}");
        assert!(out.state.scheduled_nudge.is_some());
    }
}

#[tokio::test]
async fn executors_agree_on_real_providers() {
    let (_dir, knowledge) = seeded_store();
    let graph = orchestrator(ExecutionMode::Graph, UserHealthData::default(), knowledge.clone());
    let sequential = orchestrator(ExecutionMode::Sequential, UserHealthData::default(), knowledge);
    for u in [
        "How's my overall health?",
        "Tell me about sleep and heart health",
        "Why does stress matter?",
        "I have chest pain",
    ] {
        let a = graph.process_message(u, "agree").await;
        let b = sequential.process_message(u, "agree").await;
        assert_eq!(a, b, "replies differ for {u:?}");
    }
}
