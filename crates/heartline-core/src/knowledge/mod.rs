//! Collaborator capabilities the pipeline calls to fetch facts: the user's own health metrics
//! and general heart-health knowledge snippets. Concrete providers live outside the core.

use crate::error::ProviderError;
use crate::shared::Intent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Intent-scoped metrics keyed by name. An empty map means "no data".
pub type HealthData = serde_json::Map<String, serde_json::Value>;

/// One retrieved piece of reference text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub text: String,
    pub source: String,
    pub topic: String,
}

/// Fetches the user's metrics relevant to an intent.
#[async_trait]
pub trait HealthDataProvider: Send + Sync {
    async fn fetch_health_data(&self, intent: Intent) -> Result<HealthData, ProviderError>;

    /// Whether the backing data source can currently answer.
    fn is_available(&self) -> bool {
        true
    }
}

/// Fetches up to `k` snippets for a free-text query, most relevant first.
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    async fn fetch_knowledge(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Renders snippets as the system message appended after knowledge retrieval.
pub fn format_knowledge_context(snippets: &[KnowledgeSnippet]) -> String {
    let mut out = String::from("Knowledge Context:\nRelevant Health Information:");
    for (i, s) in snippets.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, s.text));
        out.push_str(&format!("\n   Source: {} | Topic: {}", s.source, s.topic));
    }
    out
}

/// Provider with no data at all. Useful as a placeholder collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHealthData;

#[async_trait]
impl HealthDataProvider for NoHealthData {
    async fn fetch_health_data(&self, _intent: Intent) -> Result<HealthData, ProviderError> {
        Ok(HealthData::new())
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeProvider for NoKnowledge {
    async fn fetch_knowledge(&self, _query: &str, _k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_context_lists_sources() {
        let snippets = vec![
            KnowledgeSnippet {
                text: "HRV measures beat-to-beat variation.".into(),
                source: "Heart Rate Variability Research".into(),
                topic: "heart_rate_variability".into(),
            },
            KnowledgeSnippet {
                text: "Sleep 7-9 hours.".into(),
                source: "Sleep Foundation".into(),
                topic: "sleep".into(),
            },
        ];
        let ctx = format_knowledge_context(&snippets);
        assert!(ctx.starts_with("Knowledge Context:"));
        assert!(ctx.contains("\n1. HRV measures beat-to-beat variation."));
        assert!(ctx.contains("Source: Sleep Foundation | Topic: sleep"));
    }

    #[tokio::test]
    async fn placeholder_providers_return_nothing() {
        assert!(NoHealthData.fetch_health_data(Intent::SleepInquiry).await.unwrap().is_empty());
        assert!(NoKnowledge.fetch_knowledge("hrv", 3).await.unwrap().is_empty());
        assert!(!HealthDataProvider::is_available(&NoHealthData));
    }
}
