//! In-memory story log.
//!
//! Sessions are ephemeral; the log lives for the lifetime of the
//! process. The engine only ever reads a bounded tail of it, so a
//! per-session `Vec` behind a mutex is enough.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use storyloom_core::error::EngineError;
use storyloom_engine::collaborators::StoryStore;
use storyloom_engine::domain::judgment::{NarrativeCommit, StoryEntry, StoryRole};
use uuid::Uuid;

/// Process-local `StoryStore` implementation.
#[derive(Debug, Default)]
pub struct InMemoryStoryStore {
    logs: Mutex<HashMap<Uuid, Vec<StoryEntry>>>,
}

impl InMemoryStoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Vec<StoryEntry>>>, EngineError> {
        self.logs
            .lock()
            .map_err(|_| EngineError::Infrastructure("story log lock poisoned".to_owned()))
    }
}

#[async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn append_entry(&self, session_id: Uuid, entry: StoryEntry) -> Result<(), EngineError> {
        self.lock()?.entry(session_id).or_default().push(entry);
        Ok(())
    }

    async fn commit(&self, commit: &NarrativeCommit) -> Result<Uuid, EngineError> {
        self.lock()?
            .entry(commit.session_id)
            .or_default()
            .push(StoryEntry {
                role: StoryRole::Narrator,
                content: commit.narrative.clone(),
                created_at: commit.committed_at,
            });
        Ok(Uuid::new_v4())
    }

    async fn recent_history(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoryEntry>, EngineError> {
        let logs = self.lock()?;
        let Some(entries) = logs.get(&session_id) else {
            return Ok(Vec::new());
        };
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }
}
