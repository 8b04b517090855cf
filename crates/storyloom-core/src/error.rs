//! Engine error taxonomy.
//!
//! Nothing here is fatal to the process: every failure is scoped to one
//! session's round and leaves other sessions untouched.

use thiserror::Error;
use uuid::Uuid;

/// The AI phase a collaborator failure occurred in. Carried on the wire in
/// `ai_generation_error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiPhase {
    /// The Judge call (action analysis / difficulty assignment).
    Judgment,
    /// The Narrator call (story generation).
    Narrative,
}

impl AiPhase {
    /// Returns the wire name for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Judgment => "judgment",
            Self::Narrative => "narrative",
        }
    }
}

impl std::fmt::Display for AiPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The submitting character already has an action queued this round.
    #[error("character {character_id} already has an action queued this round")]
    DuplicateAction {
        /// The character that already queued.
        character_id: Uuid,
    },

    /// Action text was empty after trimming.
    #[error("action text cannot be empty")]
    EmptyActionText,

    /// Action text exceeded the configured length limit.
    #[error("action text exceeds the {limit} character limit")]
    ActionTooLong {
        /// The configured limit.
        limit: usize,
    },

    /// A submitted raw roll was outside the d20 range.
    #[error("dice roll {value} is outside the 1..=20 range")]
    InvalidRoll {
        /// The rejected value.
        value: i32,
    },

    /// A roll was submitted for an action with no judgment yet.
    #[error("no judgment exists for action {action_id}")]
    NoJudgment {
        /// The action that has not been judged.
        action_id: u64,
    },

    /// A roll was submitted for an already-resolved action.
    #[error("action {action_id} already has a resolved roll")]
    DuplicateRoll {
        /// The action that was already rolled.
        action_id: u64,
    },

    /// A second judgment was issued for an already-judged action.
    #[error("action {action_id} already has a judgment")]
    DuplicateJudgment {
        /// The action that was already judged.
        action_id: u64,
    },

    /// A roll echoed a judgment identifier no slot in the round carries.
    #[error("judgment {judgment_id} does not belong to the current round")]
    UnknownJudgment {
        /// The unrecognized judgment identifier.
        judgment_id: Uuid,
    },

    /// A roll echoed a judgment issued for a different character.
    #[error("judgment {judgment_id} was not issued for character {character_id}")]
    NotJudgmentOwner {
        /// The judgment the roll echoed.
        judgment_id: Uuid,
        /// The character the roll was submitted for.
        character_id: Uuid,
    },

    /// An operation arrived in a phase that does not accept it.
    #[error("cannot {operation} while session is in {phase} phase")]
    WrongPhase {
        /// The rejected operation.
        operation: &'static str,
        /// The phase the session was in.
        phase: &'static str,
    },

    /// The sender is not a participant of this session.
    #[error("user {user_id} is not a participant of this session")]
    UnknownParticipant {
        /// The unrecognized user.
        user_id: Uuid,
    },

    /// An advance acknowledgment referenced an index other than the
    /// round's current one.
    #[error("acknowledgment for index {index} does not match the current action")]
    StaleAck {
        /// The acknowledged index.
        index: usize,
    },

    /// An acknowledgment came from someone other than the action's
    /// owner (or the host).
    #[error("user {user_id} does not own the action awaiting acknowledgment")]
    NotActionOwner {
        /// The rejected user.
        user_id: Uuid,
    },

    /// A host-only operation was attempted by a non-host.
    #[error("user {user_id} is not the session host")]
    NotHost {
        /// The non-host user.
        user_id: Uuid,
    },

    /// A Judge or Narrator call failed; the round stalls and is retryable.
    #[error("{phase} collaborator failed: {message}")]
    Collaborator {
        /// Which AI phase failed.
        phase: AiPhase,
        /// Collaborator-reported reason.
        message: String,
    },

    /// Best-effort event delivery failed. Never retried by the engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// Story store or other infrastructure failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl EngineError {
    /// True for locally-rejected submissions that leave round state
    /// untouched (surfaced to the caller only, never as a round failure).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Collaborator { .. } | Self::Transport(_) | Self::Infrastructure(_)
        )
    }
}
