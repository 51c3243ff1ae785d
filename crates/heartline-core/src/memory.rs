//! Conversation checkpoints: a hot cache (DashMap) and an optional long-term Sled DB.
//!
//! The graph executor writes one checkpoint per finished stage, keyed by thread id, so an
//! interrupted turn can resume and the next turn can load earlier messages.

use crate::error::CheckpointError;
use crate::orchestrator::Stage;
use crate::shared::ConversationState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_CHECKPOINT_PATH: &str = "./data/heartline_checkpoints";
const CHECKPOINT_PREFIX: &str = "checkpoint/";

fn checkpoint_key(thread_id: &str) -> String {
    format!("{}{}", CHECKPOINT_PREFIX, thread_id)
}

/// Snapshot of a thread after some stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: ConversationState,
    /// Stage to run next. `None` once the turn has completed.
    pub next_stage: Option<Stage>,
    /// Stages executed so far in this turn.
    pub step: u32,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: &str, state: ConversationState, next_stage: Option<Stage>, step: u32) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            state,
            next_stage,
            step,
            updated_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_stage.is_none()
    }
}

/// Persists and loads checkpoints keyed by thread id. Must be safe under concurrent use.
pub trait ConversationStore: Send + Sync {
    fn persist_conversation(&self, thread_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    fn load_conversation(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
}

/// Process-local store. Checkpoints vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConversationStore for MemoryCheckpointStore {
    fn persist_conversation(&self, thread_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.entries.insert(thread_id.to_string(), checkpoint.clone());
        Ok(())
    }

    fn load_conversation(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.entries.get(thread_id).map(|c| c.clone()))
    }
}

/// Sled-backed store with a hot cache checked before disk.
pub struct SledCheckpointStore {
    db: Db,
    cache: Arc<DashMap<String, Checkpoint>>,
}

impl SledCheckpointStore {
    /// Opens or creates a Sled database at `./data/heartline_checkpoints`.
    pub fn new() -> Result<Self, CheckpointError> {
        Self::open_path(DEFAULT_CHECKPOINT_PATH)
    }

    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), CheckpointError> {
        self.db.flush()?;
        Ok(())
    }

    /// Thread ids with a stored checkpoint.
    pub fn thread_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(CHECKPOINT_PREFIX.as_bytes()) {
            let (k, _) = item?;
            let key = String::from_utf8_lossy(&k);
            if let Some(id) = key.strip_prefix(CHECKPOINT_PREFIX) {
                out.push(id.to_string());
            }
        }
        Ok(out)
    }
}

impl ConversationStore for SledCheckpointStore {
    fn persist_conversation(&self, thread_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec(checkpoint)?;
        self.db.insert(checkpoint_key(thread_id).as_bytes(), bytes)?;
        self.cache.insert(thread_id.to_string(), checkpoint.clone());
        Ok(())
    }

    fn load_conversation(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        if let Some(c) = self.cache.get(thread_id) {
            return Ok(Some(c.clone()));
        }
        let Some(raw) = self.db.get(checkpoint_key(thread_id).as_bytes())? else {
            return Ok(None);
        };
        let checkpoint: Checkpoint = serde_json::from_slice(&raw)?;
        self.cache.insert(thread_id.to_string(), checkpoint.clone());
        Ok(Some(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(thread: &str, next: Option<Stage>) -> Checkpoint {
        let state = ConversationState::from_utterance("How did I sleep last night?");
        Checkpoint::new(thread, state, next, 1)
    }

    #[test]
    fn memory_store_round_trips_by_thread() {
        let store = MemoryCheckpointStore::new();
        store.persist_conversation("a", &sample("a", Some(Stage::DataRetrieval))).unwrap();
        store.persist_conversation("b", &sample("b", None)).unwrap();

        let a = store.load_conversation("a").unwrap().unwrap();
        assert_eq!(a.next_stage, Some(Stage::DataRetrieval));
        assert!(store.load_conversation("b").unwrap().unwrap().is_complete());
        assert!(store.load_conversation("missing").unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledCheckpointStore::open_path(dir.path()).unwrap();
            store.persist_conversation("t-1", &sample("t-1", None)).unwrap();
            store.flush().unwrap();
        }
        let store = SledCheckpointStore::open_path(dir.path()).unwrap();
        let loaded = store.load_conversation("t-1").unwrap().expect("checkpoint on disk");
        assert_eq!(loaded.thread_id, "t-1");
        assert_eq!(loaded.state.messages[0].content, "How did I sleep last night?");
        assert_eq!(store.thread_ids().unwrap(), vec!["t-1".to_string()]);
    }
}
