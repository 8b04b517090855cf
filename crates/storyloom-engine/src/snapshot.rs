//! Read-only session snapshots.
//!
//! The session actor publishes a fresh snapshot after every command it
//! processes. Readers (HTTP queries, joining clients) observe the
//! latest state through a watch channel without ever entering the
//! actor's mailbox, so a long collaborator call never blocks them.

use serde::Serialize;
use storyloom_rules::RollOutcome;
use uuid::Uuid;

use crate::domain::round::{Round, SessionPhase};
use crate::events::ParticipantSummary;

/// Progress of one action within the round, as visible to everyone.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    /// Action identifier.
    pub action_id: u64,
    /// Acting character.
    pub character_id: Uuid,
    /// Character display name.
    pub character_name: String,
    /// Whether the referee has ruled.
    pub judged: bool,
    /// Whether the roll has resolved.
    pub rolled: bool,
    /// The outcome, once rolled.
    pub outcome: Option<RollOutcome>,
}

/// The round in flight, if any.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSnapshot {
    /// Index of the action currently at the table.
    pub judgment_index: usize,
    /// Total actions in the round.
    pub total_actions: usize,
    /// Per-action progress in queue order.
    pub slots: Vec<SlotSnapshot>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: Uuid,
    /// Current phase.
    pub phase: SessionPhase,
    /// Actions queued for the round being collected.
    pub queue_count: usize,
    /// Actions already queued for the round after this one.
    pub pending_count: usize,
    /// Connected participants.
    pub participants: Vec<ParticipantSummary>,
    /// The round in flight, if any.
    pub round: Option<RoundSnapshot>,
}

impl SessionSnapshot {
    /// An empty snapshot for a session with no activity yet.
    #[must_use]
    pub fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Idle,
            queue_count: 0,
            pending_count: 0,
            participants: Vec::new(),
            round: None,
        }
    }
}

/// Captures the round's per-slot progress.
#[must_use]
pub fn round_snapshot(round: &Round, character_name: impl Fn(Uuid) -> String) -> RoundSnapshot {
    RoundSnapshot {
        judgment_index: round.current_index(),
        total_actions: round.len(),
        slots: round
            .slots()
            .iter()
            .map(|slot| SlotSnapshot {
                action_id: slot.action.action_id,
                character_id: slot.action.character_id,
                character_name: character_name(slot.action.character_id),
                judged: slot.judgment.is_some(),
                rolled: slot.roll.is_some(),
                outcome: slot.roll.map(|r| r.outcome),
            })
            .collect(),
    }
}
