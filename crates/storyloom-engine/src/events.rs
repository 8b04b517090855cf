//! Wire-level messages.
//!
//! Both directions are externally-tagged JSON: an `event` field names
//! the message, and the remaining fields are its payload. Client
//! commands are what players send over the socket; server events are
//! what the engine pushes back, either to one participant or to the
//! whole table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storyloom_rules::{Ability, RollOutcome};
use uuid::Uuid;

use crate::domain::judgment::CharacterProfile;
use crate::snapshot::SessionSnapshot;

/// Commands a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join a session with a character. The first joiner becomes host.
    JoinSession {
        /// Target session.
        session_id: Uuid,
        /// Joining user.
        user_id: Uuid,
        /// The character the user plays.
        character: CharacterProfile,
    },
    /// Leave the session.
    LeaveSession {
        /// Target session.
        session_id: Uuid,
        /// Leaving user.
        user_id: Uuid,
    },
    /// Declare a free-text action for the current (or next) round.
    SubmitPlayerAction {
        /// Target session.
        session_id: Uuid,
        /// Submitting user.
        user_id: Uuid,
        /// Acting character.
        character_id: Uuid,
        /// What the player wants to do.
        action_text: String,
        /// The ability the player frames the attempt under.
        #[serde(default = "default_action_type")]
        action_type: Ability,
    },
    /// Host-only: close collection and start judging the queue.
    StartRound {
        /// Target session.
        session_id: Uuid,
        /// Requesting user; must be host.
        user_id: Uuid,
    },
    /// Submit a d20 result for an issued judgment.
    RollDice {
        /// Target session.
        session_id: Uuid,
        /// Rolling user.
        user_id: Uuid,
        /// Rolling character.
        character_id: Uuid,
        /// The judgment being answered.
        judgment_id: Uuid,
        /// The raw die face.
        dice_result: i32,
    },
    /// Acknowledge the current roll's resolution so the table advances.
    NextJudgment {
        /// Target session.
        session_id: Uuid,
        /// Acknowledging user; must own the current action.
        user_id: Uuid,
        /// The round index being acknowledged.
        current_index: usize,
    },
    /// Host-only: re-invoke the referee after a judgment failure.
    RetryJudgment {
        /// Target session.
        session_id: Uuid,
        /// Requesting user; must be host.
        user_id: Uuid,
    },
    /// Host-only: re-run narration after a narrative failure.
    RetryNarration {
        /// Target session.
        session_id: Uuid,
        /// Requesting user; must be host.
        user_id: Uuid,
    },
    /// Host-only: end the session, discarding any round in flight.
    EndSession {
        /// Target session.
        session_id: Uuid,
        /// Requesting user; must be host.
        user_id: Uuid,
    },
}

fn default_action_type() -> Ability {
    Ability::Dexterity
}

impl ClientCommand {
    /// The session a command targets.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::JoinSession { session_id, .. }
            | Self::LeaveSession { session_id, .. }
            | Self::SubmitPlayerAction { session_id, .. }
            | Self::StartRound { session_id, .. }
            | Self::RollDice { session_id, .. }
            | Self::NextJudgment { session_id, .. }
            | Self::RetryJudgment { session_id, .. }
            | Self::RetryNarration { session_id, .. }
            | Self::EndSession { session_id, .. } => *session_id,
        }
    }
}

/// A participant as listed in roster broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSummary {
    /// Participant user id.
    pub user_id: Uuid,
    /// Their character.
    pub character_id: Uuid,
    /// Character display name.
    pub character_name: String,
    /// Whether this participant hosts the session.
    pub is_host: bool,
}

/// An action as broadcast to the table. The text itself stays private
/// to the submitter until the referee rules on it.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSummary {
    /// Action identifier.
    pub action_id: u64,
    /// Acting character.
    pub character_id: Uuid,
    /// Character display name.
    pub character_name: String,
    /// Queue position.
    pub order: usize,
}

/// One resolved action as reported in `story_generation_complete`.
#[derive(Debug, Clone, Serialize)]
pub struct JudgmentSummary {
    /// Acting character.
    pub character_id: Uuid,
    /// Character display name.
    pub character_name: String,
    /// The action text, now public.
    pub action_text: String,
    /// Raw die face.
    pub dice_result: u32,
    /// Modifier applied to the roll.
    pub modifier: i32,
    /// Raw roll plus modifier.
    pub final_value: i32,
    /// Difficulty class the roll faced.
    pub difficulty: i32,
    /// The referee's reasoning.
    pub difficulty_reasoning: String,
    /// Resolution outcome.
    pub outcome: RollOutcome,
}

/// Events the engine pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A participant joined; carries the refreshed roster.
    UserJoined {
        /// Session.
        session_id: Uuid,
        /// Joining user.
        user_id: Uuid,
        /// Their character's name.
        character_name: String,
        /// Full roster after the join.
        participants: Vec<ParticipantSummary>,
    },
    /// A participant left; carries the refreshed roster.
    UserLeft {
        /// Session.
        session_id: Uuid,
        /// Leaving user.
        user_id: Uuid,
        /// Their character's name.
        character_name: String,
        /// Full roster after the departure.
        participants: Vec<ParticipantSummary>,
    },
    /// Current session state, sent privately to a joining participant.
    SessionSnapshot {
        /// The snapshot.
        snapshot: SessionSnapshot,
    },
    /// An action entered the queue.
    ActionSubmitted {
        /// Session.
        session_id: Uuid,
        /// The queued action, text withheld.
        action: ActionSummary,
        /// Queue size after the submit.
        queue_count: usize,
    },
    /// The queue size changed.
    QueueUpdated {
        /// Session.
        session_id: Uuid,
        /// Current queue size.
        queue_count: usize,
    },
    /// Private to the submitter: the referee has ruled, roll now.
    JudgmentReady {
        /// Session.
        session_id: Uuid,
        /// Identifier to echo back with the roll.
        judgment_id: Uuid,
        /// Acting character.
        character_id: Uuid,
        /// The submitter's own action text.
        action_text: String,
        /// Modifier that will apply to the roll.
        modifier: i32,
        /// Difficulty class to beat.
        difficulty: i32,
        /// The referee's reasoning.
        difficulty_reasoning: String,
    },
    /// To everyone but the submitter: whose action is being resolved.
    PlayerActionAnalyzed {
        /// Session.
        session_id: Uuid,
        /// The judgment awaiting the owner's roll.
        judgment_id: Uuid,
        /// Acting character.
        character_id: Uuid,
        /// Character display name.
        character_name: String,
        /// The action being attempted.
        action_text: String,
        /// Modifier that will apply to the roll.
        modifier: i32,
        /// Difficulty class assigned.
        difficulty: i32,
        /// The referee's reasoning.
        difficulty_reasoning: String,
    },
    /// The table advanced to the next queued action.
    NextJudgment {
        /// Session.
        session_id: Uuid,
        /// Index of the action now being judged.
        judgment_index: usize,
    },
    /// A roll was received and is being resolved.
    DiceRolling {
        /// Session.
        session_id: Uuid,
        /// The action being resolved.
        action_id: u64,
    },
    /// A roll resolved; everyone sees the result.
    DiceRolled {
        /// Session.
        session_id: Uuid,
        /// The judgment the roll answered.
        judgment_id: Uuid,
        /// Rolling character.
        character_id: Uuid,
        /// Character display name.
        character_name: String,
        /// Raw die face.
        dice_result: u32,
        /// Modifier applied.
        modifier: i32,
        /// Raw roll plus modifier.
        final_value: i32,
        /// Difficulty class faced.
        difficulty: i32,
        /// Resolution outcome.
        outcome: RollOutcome,
    },
    /// Every action in the round has resolved.
    AllDiceRolled {
        /// Session.
        session_id: Uuid,
    },
    /// Narration is starting.
    StoryGenerationStarted {
        /// Session.
        session_id: Uuid,
    },
    /// One incremental narrative token.
    NarrativeToken {
        /// Session.
        session_id: Uuid,
        /// The token text.
        token: String,
    },
    /// Narration finished and the round is committed.
    StoryGenerationComplete {
        /// Session.
        session_id: Uuid,
        /// The full narrative text.
        narrative: String,
        /// Every resolved action of the round.
        judgments: Vec<JudgmentSummary>,
    },
    /// An AI collaborator failed; the round stalls until retried.
    AiGenerationError {
        /// Session.
        session_id: Uuid,
        /// Human-readable failure description.
        error: String,
        /// Which phase failed: `"judgment"` or `"narrative"`.
        phase: String,
    },
    /// A command was rejected; sent only to its issuer.
    Error {
        /// Session.
        session_id: Uuid,
        /// Why the command was rejected.
        message: String,
    },
    /// The session ended; all round state was discarded.
    SessionEnded {
        /// Session.
        session_id: Uuid,
        /// Why the session ended.
        reason: String,
    },
}

impl ServerEvent {
    /// Serializes the event to its wire JSON form.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails, which only
    /// happens for non-string map keys and similar shapes this enum
    /// does not contain.
    pub fn to_wire(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
