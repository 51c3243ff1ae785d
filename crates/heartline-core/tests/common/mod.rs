//! Stub collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use heartline_core::{
    ConversationStore, ExecutionMode, FixedClock, HealthData, HealthDataProvider, Intent, KnowledgeProvider,
    KnowledgeSnippet, MemoryCheckpointStore, Orchestrator, PipelineAgents, PipelineConfig, PipelineError,
    ProactiveScheduler, ProviderError, ResponseComposer, MAX_MESSAGE_CHARS,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const MODES: [ExecutionMode; 2] = [ExecutionMode::Graph, ExecutionMode::Sequential];

fn object(v: Value) -> HealthData {
    v.as_object().cloned().unwrap_or_default()
}

/// Fixed metrics for one user; weekly progress and sleep quality are adjustable.
pub struct StubHealthData {
    pub weekly_progress: String,
    pub sleep_quality: u32,
    pub bp_trend: String,
}

impl Default for StubHealthData {
    fn default() -> Self {
        Self {
            weekly_progress: "83.7%".to_string(),
            sleep_quality: 78,
            bp_trend: "improving".to_string(),
        }
    }
}

#[async_trait]
impl HealthDataProvider for StubHealthData {
    async fn fetch_health_data(&self, intent: Intent) -> Result<HealthData, ProviderError> {
        let data = match intent {
            Intent::BpMonitoring => json!({
                "blood_pressure": {
                    "latest": {"systolic": 128, "diastolic": 82, "timestamp": "2024-01-15T08:30:00Z"},
                    "trend": self.bp_trend,
                    "weekly_avg": {"systolic": 132, "diastolic": 85}
                }
            }),
            Intent::ActivityCheck => json!({
                "steps": {"today": 6500, "weekly_total": 41000, "weekly_goal": 49000, "daily_avg": 5857},
                "weekly_progress": self.weekly_progress
            }),
            Intent::SleepInquiry => json!({
                "sleep": {"hours": 7.2, "quality_score": self.sleep_quality}
            }),
            _ => json!({
                "blood_pressure": {"systolic": 128, "diastolic": 82},
                "steps_today": 6500,
                "sleep_quality": self.sleep_quality,
                "hrv": 45
            }),
        };
        Ok(object(data))
    }
}

/// Always fails; counts calls.
#[derive(Default)]
pub struct FailingHealthData {
    pub calls: AtomicU32,
}

#[async_trait]
impl HealthDataProvider for FailingHealthData {
    async fn fetch_health_data(&self, _intent: Intent) -> Result<HealthData, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Backend("wearable sync timed out".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Fails the first `failures` calls, then delegates to [`StubHealthData`].
pub struct FlakyHealthData {
    pub failures: u32,
    pub calls: AtomicU32,
    pub inner: StubHealthData,
}

#[async_trait]
impl HealthDataProvider for FlakyHealthData {
    async fn fetch_health_data(&self, intent: Intent) -> Result<HealthData, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(ProviderError::Unavailable("warming up".to_string()));
        }
        self.inner.fetch_health_data(intent).await
    }
}

/// Answers HRV questions with one snippet; nothing otherwise.
pub struct StubKnowledge;

#[async_trait]
impl KnowledgeProvider for StubKnowledge {
    async fn fetch_knowledge(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        if !query.to_lowercase().contains("hrv") {
            return Ok(Vec::new());
        }
        let snippet = KnowledgeSnippet {
            text: "Heart rate variability measures the variation in time between heartbeats.".to_string(),
            source: "Heart Rate Variability Research".to_string(),
            topic: "heart_rate_variability".to_string(),
        };
        Ok(std::iter::repeat(snippet).take(k.min(1)).collect())
    }
}

/// Composer that always produces a blocked phrase.
pub struct UnsafeComposer;

#[async_trait]
impl ResponseComposer for UnsafeComposer {
    async fn compose(&self, _intent: Intent, _data: &HealthData) -> Result<String, PipelineError> {
        Ok("Based on your readings, you should stop taking your medication.".to_string())
    }
}

/// Composer whose reply already sits at the message length limit.
pub struct LongComposer;

#[async_trait]
impl ResponseComposer for LongComposer {
    async fn compose(&self, _intent: Intent, _data: &HealthData) -> Result<String, PipelineError> {
        Ok(format!("Your health data looks steady. {}", "a".repeat(MAX_MESSAGE_CHARS)))
    }
}

/// Ignores `k` and returns `k + extra` matching snippets.
pub struct OverfullKnowledge {
    pub extra: usize,
}

#[async_trait]
impl KnowledgeProvider for OverfullKnowledge {
    async fn fetch_knowledge(&self, _query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        Ok((0..k + self.extra)
            .map(|i| KnowledgeSnippet {
                text: format!("Snippet number {i} about heart rate variability."),
                source: format!("Source {i}"),
                topic: "hrv".to_string(),
            })
            .collect())
    }
}

pub fn config() -> PipelineConfig {
    PipelineConfig::default()
}

pub fn agents(
    cfg: &PipelineConfig,
    health: Arc<dyn HealthDataProvider>,
    knowledge: Arc<dyn KnowledgeProvider>,
) -> PipelineAgents {
    PipelineAgents::new(cfg, health, knowledge)
        .with_scheduler(ProactiveScheduler::with_clock(cfg, Arc::new(FixedClock::at_hour(10))))
}

pub fn orchestrator_with(mode: ExecutionMode, agents: PipelineAgents) -> Orchestrator {
    let store: Arc<dyn ConversationStore> = Arc::new(MemoryCheckpointStore::new());
    Orchestrator::with_mode(mode, "user123", agents, store)
}

pub fn orchestrator(mode: ExecutionMode) -> Orchestrator {
    let cfg = config();
    orchestrator_with(mode, agents(&cfg, Arc::new(StubHealthData::default()), Arc::new(StubKnowledge)))
}
