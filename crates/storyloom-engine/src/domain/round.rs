//! Round state: the phase machine and the per-action judgment and roll
//! bookkeeping that drives one action at a time through the table.

use serde::Serialize;
use storyloom_core::error::EngineError;
use storyloom_rules::{determine_outcome, final_value};
use uuid::Uuid;

use super::action::{ActionQueue, QueuedAction};
use super::judgment::{DiceRoll, Judgment, ResolvedAction};

/// The session's position in the round lifecycle.
///
/// Transitions only move forward within a round; a completed or
/// discarded round returns the session to `Idle` (or straight to
/// `Collecting` when actions are already waiting for the next round).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No round in progress and nothing queued.
    Idle,
    /// Players are declaring actions for the next round.
    Collecting,
    /// The AI referee is ruling on the current action.
    Judging,
    /// Waiting on the current action's owner to roll and acknowledge.
    AwaitingRoll,
    /// The AI narrator is streaming the round's story.
    Narrating,
}

impl SessionPhase {
    /// Wire-level name of the phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Judging => "judging",
            Self::AwaitingRoll => "awaiting_roll",
            Self::Narrating => "narrating",
        }
    }
}

/// One action's slot within a round.
#[derive(Debug)]
pub struct RoundSlot {
    /// The queued action.
    pub action: QueuedAction,
    /// The referee's ruling, once issued.
    pub judgment: Option<Judgment>,
    /// The resolved roll, once received.
    pub roll: Option<DiceRoll>,
}

impl RoundSlot {
    fn new(action: QueuedAction) -> Self {
        Self {
            action,
            judgment: None,
            roll: None,
        }
    }
}

/// A round in flight: the drained action queue plus a cursor over it.
///
/// Exactly one slot is "current" at a time. The cursor only advances
/// once both halves of the advance handshake have arrived: the server
/// side (the current roll resolved) and the client side (the roller's
/// acknowledgment). Either half may arrive first; each is buffered
/// until its partner shows up, and the pair is consumed exactly once.
#[derive(Debug)]
pub struct Round {
    slots: Vec<RoundSlot>,
    current_index: usize,
    advance_pending: Option<usize>,
    ack_received: Option<usize>,
    /// Set when narration failed after entering the narrating phase, so
    /// the host may retry.
    pub narration_failed: bool,
}

impl Round {
    /// Builds a round from a drained action queue.
    #[must_use]
    pub fn new(queue: ActionQueue) -> Self {
        Self {
            slots: queue.drain_in_order().map(RoundSlot::new).collect(),
            current_index: 0,
            advance_pending: None,
            ack_received: None,
            narration_failed: false,
        }
    }

    /// Zero-based index of the slot currently being judged or rolled.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Total number of actions in the round.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the round holds no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The current slot.
    #[must_use]
    pub fn current(&self) -> Option<&RoundSlot> {
        self.slots.get(self.current_index)
    }

    /// All slots, in queue order.
    #[must_use]
    pub fn slots(&self) -> &[RoundSlot] {
        &self.slots
    }

    /// Records the referee's ruling on the current slot.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DuplicateJudgment` if the current slot was
    /// already judged.
    pub fn record_judgment(&mut self, judgment: Judgment) -> Result<(), EngineError> {
        let index = self.current_index;
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(EngineError::WrongPhase {
                operation: "record_judgment",
                phase: "round exhausted",
            });
        };
        if slot.judgment.is_some() {
            return Err(EngineError::DuplicateJudgment {
                action_id: slot.action.action_id,
            });
        }
        slot.judgment = Some(judgment);
        Ok(())
    }

    /// Resolves a dice roll against the judgment it echoes.
    ///
    /// The raw roll must already be validated to 1..=20. Returns the
    /// slot index and the resolved roll.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownJudgment` if no slot carries the
    /// judgment, `EngineError::NotJudgmentOwner` if the judgment was
    /// issued for a different character, `EngineError::NoJudgment` if
    /// the roller's own slot is still unjudged, or
    /// `EngineError::DuplicateRoll` if the slot was already rolled.
    pub fn resolve_roll(
        &mut self,
        judgment_id: Uuid,
        character_id: Uuid,
        raw_roll: u32,
    ) -> Result<(usize, DiceRoll), EngineError> {
        let position = self
            .slots
            .iter()
            .position(|s| s.judgment.as_ref().is_some_and(|j| j.judgment_id == judgment_id));
        let Some(index) = position else {
            // Distinguish "rolled before judgment" from a bogus id.
            if let Some(slot) = self
                .slots
                .iter()
                .find(|s| s.action.character_id == character_id && s.judgment.is_none())
            {
                return Err(EngineError::NoJudgment {
                    action_id: slot.action.action_id,
                });
            }
            return Err(EngineError::UnknownJudgment { judgment_id });
        };

        let slot = &mut self.slots[index];
        // A judgment can only be answered by the character it was issued for.
        if slot.action.character_id != character_id {
            return Err(EngineError::NotJudgmentOwner {
                judgment_id,
                character_id,
            });
        }
        if slot.roll.is_some() {
            return Err(EngineError::DuplicateRoll {
                action_id: slot.action.action_id,
            });
        }
        let judgment = slot
            .judgment
            .as_ref()
            .ok_or(EngineError::NoJudgment {
                action_id: slot.action.action_id,
            })?;
        let roll = DiceRoll {
            action_id: slot.action.action_id,
            raw_roll,
            final_value: final_value(raw_roll, judgment.modifier),
            outcome: determine_outcome(raw_roll, judgment.modifier, judgment.difficulty),
        };
        slot.roll = Some(roll);
        Ok((index, roll))
    }

    /// Buffers the server half of the advance handshake.
    pub fn buffer_advance(&mut self, index: usize) {
        self.advance_pending = Some(index);
    }

    /// Buffers the client half of the advance handshake.
    pub fn buffer_ack(&mut self, index: usize) {
        self.ack_received = Some(index);
    }

    /// Consumes a matched advance/ack pair for the current slot, moving
    /// the cursor forward. Returns the index just left behind, or
    /// `None` if the handshake is still incomplete.
    pub fn take_ready_advance(&mut self) -> Option<usize> {
        let index = self.current_index;
        if self.advance_pending == Some(index) && self.ack_received == Some(index) {
            self.advance_pending = None;
            self.ack_received = None;
            self.current_index += 1;
            Some(index)
        } else {
            None
        }
    }

    /// Whether the cursor has moved past the last slot.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.slots.len()
    }

    /// Assembles the round's resolved actions in queue order, or `None`
    /// if any slot is still missing a judgment or a roll.
    #[must_use]
    pub fn resolved_actions(
        &self,
        character_name: impl Fn(Uuid) -> String,
    ) -> Option<Vec<ResolvedAction>> {
        self.slots
            .iter()
            .map(|slot| {
                Some(ResolvedAction {
                    action: slot.action.clone(),
                    character_name: character_name(slot.action.character_id),
                    judgment: slot.judgment.clone()?,
                    roll: slot.roll?,
                })
            })
            .collect()
    }
}
