//! The per-round action queue.
//!
//! Actions accumulate while a session is collecting. Each character may
//! hold at most one queued action per round, and queue order is the
//! order judgments are later issued in.

use serde::Serialize;
use storyloom_core::error::EngineError;
use storyloom_rules::Ability;
use uuid::Uuid;

/// A free-text action a player has declared for the current round.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedAction {
    /// Monotonic per-session action identifier.
    pub action_id: u64,
    /// The acting character.
    pub character_id: Uuid,
    /// The participant who submitted the action.
    pub user_id: Uuid,
    /// What the player wants to do, verbatim.
    pub action_text: String,
    /// The ability the player declared the attempt under.
    pub action_type: Ability,
    /// Zero-based position within the round.
    pub order: usize,
}

/// FIFO queue of declared actions for one round.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Vec<QueuedAction>,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action, assigning its queue order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DuplicateAction` if the character already
    /// has an action queued.
    pub fn enqueue(
        &mut self,
        action_id: u64,
        character_id: Uuid,
        user_id: Uuid,
        action_text: String,
        action_type: Ability,
    ) -> Result<&QueuedAction, EngineError> {
        if self.actions.iter().any(|a| a.character_id == character_id) {
            return Err(EngineError::DuplicateAction { character_id });
        }
        let order = self.actions.len();
        self.actions.push(QueuedAction {
            action_id,
            character_id,
            user_id,
            action_text,
            action_type,
            order,
        });
        Ok(&self.actions[order])
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Consumes the queue, yielding actions in submission order.
    #[must_use]
    pub fn drain_in_order(self) -> std::vec::IntoIter<QueuedAction> {
        self.actions.into_iter()
    }

    /// The queued actions in submission order, without consuming.
    #[must_use]
    pub fn actions(&self) -> &[QueuedAction] {
        &self.actions
    }
}
