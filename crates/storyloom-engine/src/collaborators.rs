//! Seams to the AI collaborators and the story log.
//!
//! The engine never talks to a model or a database directly. It drives
//! these traits, and the api crate (or a test double) supplies the
//! implementations.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use storyloom_core::error::EngineError;
use storyloom_rules::Ability;
use uuid::Uuid;

use crate::domain::action::QueuedAction;
use crate::domain::judgment::{
    CharacterProfile, NarrativeCommit, ResolvedAction, StoryEntry, WorldContext,
};

/// The referee's ruling before the engine fills in character-derived
/// fields: which ability applies, how hard the attempt is, and why.
#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    /// Ability the attempt is ruled to test.
    pub ability: Ability,
    /// Difficulty class, expected within the legal band.
    pub difficulty: i32,
    /// The referee's reasoning, surfaced to players verbatim.
    pub reasoning: String,
}

/// The AI referee: rules on one action at a time.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Rules on a queued action given the character, the world, and
    /// recent story history.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Collaborator` when the ruling cannot be
    /// obtained; the round stalls in the judging phase and may be
    /// retried.
    async fn judge(
        &self,
        action: &QueuedAction,
        character: &CharacterProfile,
        world: &WorldContext,
        history: &[StoryEntry],
    ) -> Result<JudgeVerdict, EngineError>;
}

/// Token stream produced by the narrator.
pub type TokenStream = BoxStream<'static, Result<String, EngineError>>;

/// The AI narrator: turns a fully resolved round into story text,
/// delivered as an incremental token stream.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Opens a narration stream for the round's resolved actions.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Collaborator` when the stream cannot be
    /// opened. Mid-stream failures surface as `Err` items on the
    /// stream itself.
    async fn narrate(
        &self,
        results: &[ResolvedAction],
        world: &WorldContext,
        history: &[StoryEntry],
    ) -> Result<TokenStream, EngineError>;
}

/// Durable story log for a session.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Appends one entry (player action text) to the session's log.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Infrastructure` on storage failure.
    async fn append_entry(
        &self,
        session_id: Uuid,
        entry: StoryEntry,
    ) -> Result<(), EngineError>;

    /// Commits a completed round's narrative and results as one unit.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Infrastructure` on storage failure; the
    /// round stays open and the commit may be retried.
    async fn commit(&self, commit: &NarrativeCommit) -> Result<Uuid, EngineError>;

    /// Loads the most recent log entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Infrastructure` on storage failure.
    async fn recent_history(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoryEntry>, EngineError>;
}
