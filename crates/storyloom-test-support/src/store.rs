//! Test story store — recording and failing `StoryStore` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use storyloom_core::error::EngineError;
use storyloom_engine::collaborators::StoryStore;
use storyloom_engine::domain::judgment::{NarrativeCommit, StoryEntry};
use uuid::Uuid;

/// A story store that records every append and commit, and serves a
/// configurable history.
#[derive(Debug, Default)]
pub struct RecordingStoryStore {
    history: Mutex<Vec<StoryEntry>>,
    entries: Mutex<Vec<(Uuid, StoryEntry)>>,
    commits: Mutex<Vec<NarrativeCommit>>,
}

impl RecordingStoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `recent_history` serves the given entries.
    #[must_use]
    pub fn with_history(history: Vec<StoryEntry>) -> Self {
        Self {
            history: Mutex::new(history),
            entries: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Entries appended so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_entries(&self) -> Vec<(Uuid, StoryEntry)> {
        self.entries.lock().unwrap().clone()
    }

    /// Narrative commits recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn commits(&self) -> Vec<NarrativeCommit> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoryStore for RecordingStoryStore {
    async fn append_entry(&self, session_id: Uuid, entry: StoryEntry) -> Result<(), EngineError> {
        self.entries.lock().unwrap().push((session_id, entry));
        Ok(())
    }

    async fn commit(&self, commit: &NarrativeCommit) -> Result<Uuid, EngineError> {
        self.commits.lock().unwrap().push(commit.clone());
        Ok(Uuid::new_v4())
    }

    async fn recent_history(
        &self,
        _session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoryEntry>, EngineError> {
        let history = self.history.lock().unwrap();
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}

/// A story store where the chosen operations always fail.
#[derive(Debug, Default)]
pub struct FailingStoryStore {
    fail_commits: bool,
    fail_appends: bool,
}

impl FailingStoryStore {
    /// A store whose commits fail; appends and history reads succeed.
    #[must_use]
    pub fn failing_commits() -> Self {
        Self {
            fail_commits: true,
            fail_appends: false,
        }
    }

    /// A store whose appends fail; commits and history reads succeed.
    #[must_use]
    pub fn failing_appends() -> Self {
        Self {
            fail_commits: false,
            fail_appends: true,
        }
    }
}

#[async_trait]
impl StoryStore for FailingStoryStore {
    async fn append_entry(&self, _session_id: Uuid, _entry: StoryEntry) -> Result<(), EngineError> {
        if self.fail_appends {
            return Err(EngineError::Infrastructure(
                "story log unavailable".to_owned(),
            ));
        }
        Ok(())
    }

    async fn commit(&self, _commit: &NarrativeCommit) -> Result<Uuid, EngineError> {
        if self.fail_commits {
            return Err(EngineError::Infrastructure(
                "story log unavailable".to_owned(),
            ));
        }
        Ok(Uuid::new_v4())
    }

    async fn recent_history(
        &self,
        _session_id: Uuid,
        _limit: usize,
    ) -> Result<Vec<StoryEntry>, EngineError> {
        Ok(Vec::new())
    }
}
