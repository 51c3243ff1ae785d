//! Sled-backed snippet store with token-overlap ranking.
//!
//! Snippets are keyed by a monotonically increasing id so iteration order is insertion order,
//! which doubles as the tie-breaker when two snippets score the same.

use async_trait::async_trait;
use heartline_core::{KnowledgeProvider, KnowledgeSnippet, ProviderError};
use std::collections::BTreeSet;
use std::path::Path;

const TREE: &str = "heartline_snippets";

/// Words too common to say anything about relevance.
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "can", "do", "does", "explain", "for", "how", "i", "in", "is", "it",
    "me", "my", "of", "on", "tell", "the", "to", "what", "why", "you",
];

fn sample(text: &str, source: &str, topic: &str) -> KnowledgeSnippet {
    KnowledgeSnippet {
        text: text.to_string(),
        source: source.to_string(),
        topic: topic.to_string(),
    }
}

/// The reference library a fresh store is seeded with.
pub fn sample_library() -> Vec<KnowledgeSnippet> {
    vec![
        sample(
            "Regular aerobic exercise strengthens the heart muscle, improves blood circulation, and can help lower blood pressure. The American Heart Association recommends at least 150 minutes of moderate-intensity aerobic activity per week.",
            "AHA Guidelines",
            "exercise",
        ),
        sample(
            "Heart Rate Variability (HRV) measures the variation in time between consecutive heartbeats. Higher HRV generally indicates better cardiovascular health and stress resilience. Low HRV can be associated with stress, poor sleep, or underlying health conditions.",
            "Cardiology Research",
            "hrv",
        ),
        sample(
            "Blood pressure readings consist of two numbers: systolic (top) and diastolic (bottom). Normal blood pressure is below 120/80 mmHg. Hypertension is diagnosed when readings are consistently 130/80 mmHg or higher.",
            "Medical Guidelines",
            "blood_pressure",
        ),
        sample(
            "Sleep quality significantly impacts heart health. Adults should aim for 7-9 hours of quality sleep per night. Poor sleep can contribute to high blood pressure, irregular heart rhythms, and increased risk of cardiovascular disease.",
            "Sleep Medicine",
            "sleep",
        ),
        sample(
            "Stress management is crucial for heart health. Chronic stress can lead to elevated blood pressure, increased heart rate, and inflammation. Techniques like meditation, deep breathing, and regular exercise can help manage stress levels.",
            "Stress Management",
            "stress",
        ),
        sample(
            "A heart-healthy diet includes plenty of fruits, vegetables, whole grains, lean proteins, and healthy fats. Limit sodium, saturated fats, and added sugars. The Mediterranean diet is particularly beneficial for cardiovascular health.",
            "Nutrition Guidelines",
            "diet",
        ),
    ]
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn query_terms(query: &str) -> BTreeSet<String> {
    tokens(query).filter(|t| !STOPWORDS.contains(&t.as_str())).collect()
}

/// Occurrences of any query term in the snippet's text and topic.
fn score(terms: &BTreeSet<String>, snippet: &KnowledgeSnippet) -> usize {
    tokens(&snippet.text)
        .chain(tokens(&snippet.topic))
        .filter(|t| terms.contains(t))
        .count()
}

pub struct SnippetStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SnippetStore {
    pub fn new(db: sled::Db) -> Result<Self, ProviderError> {
        let tree = db.open_tree(TREE)?;
        Ok(Self { db, tree })
    }

    pub fn open_path(path: &Path) -> Result<Self, ProviderError> {
        Self::new(sled::open(path)?)
    }

    /// Opens the store and seeds the sample library when it is empty.
    pub fn open_seeded(path: &Path) -> Result<Self, ProviderError> {
        let store = Self::open_path(path)?;
        if store.is_empty() {
            for snippet in sample_library() {
                store.insert(&snippet)?;
            }
            tracing::info!(path = %path.display(), count = store.len(), "seeded knowledge store");
        }
        Ok(store)
    }

    pub fn insert(&self, snippet: &KnowledgeSnippet) -> Result<u64, ProviderError> {
        let id = self.db.generate_id()?;
        self.tree.insert(id.to_be_bytes(), serde_json::to_vec(snippet)?)?;
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn all(&self) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        self.tree
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice(&v?)?))
            .collect()
    }

    /// Top `k` snippets by term overlap with `query`. Snippets that share no terms are never returned.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        let terms = query_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut ranked: Vec<(usize, KnowledgeSnippet)> = self
            .all()?
            .into_iter()
            .map(|s| (score(&terms, &s), s))
            .filter(|(n, _)| *n > 0)
            .collect();
        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(ranked.into_iter().take(k).map(|(_, s)| s).collect())
    }

    pub fn flush(&self) -> Result<(), ProviderError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeProvider for SnippetStore {
    async fn fetch_knowledge(&self, query: &str, k: usize) -> Result<Vec<KnowledgeSnippet>, ProviderError> {
        let hits = self.search(query, k)?;
        tracing::debug!(query, hits = hits.len(), "knowledge search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (tempfile::TempDir, SnippetStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnippetStore::open_seeded(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn seeds_once() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SnippetStore::open_seeded(dir.path()).unwrap();
            assert_eq!(store.len(), 6);
            store.flush().unwrap();
        }
        let store = SnippetStore::open_seeded(dir.path()).unwrap();
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn hrv_question_finds_hrv_snippet() {
        let (_dir, store) = seeded();
        let hits = store.search("What is HRV?", 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].topic, "hrv");
        assert_eq!(hits[0].source, "Cardiology Research");
    }

    #[test]
    fn higher_frequency_ranks_first() {
        let (_dir, store) = seeded();
        let hits = store.search("Why does stress matter?", 3).unwrap();
        assert_eq!(hits[0].topic, "stress");
        assert_eq!(hits[1].topic, "hrv");
    }

    #[test]
    fn respects_k_and_skips_unrelated() {
        let (_dir, store) = seeded();
        assert_eq!(store.search("blood pressure", 2).unwrap().len(), 2);
        assert!(store.search("quantum chromodynamics", 3).unwrap().is_empty());
        assert!(store.search("what is the", 3).unwrap().is_empty());
        assert!(store.search("sleep", 0).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnippetStore::open_path(dir.path()).unwrap();
        store.insert(&sample("Walking helps.", "A", "walking")).unwrap();
        store.insert(&sample("Walking is easy.", "B", "routine")).unwrap();
        let hits = store.search("walking", 5).unwrap();
        // "walking" also matches the first snippet's topic.
        assert_eq!(hits[0].source, "A");
        assert_eq!(hits[1].source, "B");

        store.insert(&sample("Swimming helps.", "C", "cardio")).unwrap();
        store.insert(&sample("Swimming is fun.", "D", "cardio")).unwrap();
        let hits = store.search("swimming", 5).unwrap();
        assert_eq!(hits.iter().map(|s| s.source.as_str()).collect::<Vec<_>>(), vec!["C", "D"]);
    }
}
