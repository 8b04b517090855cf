//! Value types produced as a round moves through judgment, dice
//! resolution, and narration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_rules::{Ability, AbilityScores, RollOutcome, StatusEffect};
use uuid::Uuid;

use super::action::QueuedAction;

/// A player character as the engine sees it: identity, ability scores,
/// and any active status effects that shift its roll modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// Character identifier.
    pub id: Uuid,
    /// Display name shown in broadcasts.
    pub name: String,
    /// The six ability scores.
    pub abilities: AbilityScores,
    /// Active status effects, each carrying a flat modifier.
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
}

/// The AI referee's ruling for one queued action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Identifier the rolling client echoes back with its dice result.
    pub judgment_id: Uuid,
    /// The action this ruling applies to.
    pub action_id: u64,
    /// Ability the referee ruled relevant.
    pub ability: Ability,
    /// The character's score in that ability at ruling time.
    pub ability_score: i32,
    /// Effective modifier (ability modifier plus status effects).
    pub modifier: i32,
    /// Difficulty class the roll must meet.
    pub difficulty: i32,
    /// The referee's stated reasoning for the difficulty.
    pub reasoning: String,
}

/// A resolved d20 roll for one judged action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiceRoll {
    /// The action this roll resolves.
    pub action_id: u64,
    /// The raw die face, 1 through 20.
    pub raw_roll: u32,
    /// Raw roll plus the judgment's modifier.
    pub final_value: i32,
    /// Outcome after comparing against the difficulty class.
    pub outcome: RollOutcome,
}

/// A fully resolved action: what was attempted, how it was judged, and
/// how the dice fell.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAction {
    /// The original queued action.
    pub action: QueuedAction,
    /// Name of the acting character at resolution time.
    pub character_name: String,
    /// The referee's ruling.
    pub judgment: Judgment,
    /// The resolved roll.
    pub roll: DiceRoll,
}

/// The narrative text plus the resolved actions it describes, committed
/// to the story log as one unit when streaming completes.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeCommit {
    /// Session the round belongs to.
    pub session_id: Uuid,
    /// The full accumulated narrative text.
    pub narrative: String,
    /// Every resolved action of the round, in queue order.
    pub results: Vec<ResolvedAction>,
    /// Commit timestamp.
    pub committed_at: DateTime<Utc>,
}

/// Who authored a story log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryRole {
    /// Player-submitted action text.
    Player,
    /// AI-generated narrative.
    Narrator,
}

/// One entry in a session's story log, fed back to the AI collaborators
/// as conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryEntry {
    /// Entry author.
    pub role: StoryRole,
    /// Entry text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The fictional setting the AI collaborators narrate within.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldContext {
    /// Free-text description of the world and its tone.
    pub description: String,
}

impl WorldContext {
    /// Creates a world context from a description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}
