//! The session roster and best-effort event delivery.
//!
//! Each participant holds an unbounded sender their socket task drains.
//! Delivery never blocks the session actor, and a closed channel is
//! logged and skipped rather than retried.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::judgment::CharacterProfile;
use crate::events::{ParticipantSummary, ServerEvent};

/// Sending half of a participant's private event channel.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// One connected player.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Participant user id.
    pub user_id: Uuid,
    /// Their character.
    pub profile: CharacterProfile,
    /// Channel their socket task drains.
    pub sender: EventSender,
    /// When they joined.
    pub joined_at: DateTime<Utc>,
}

/// The ordered roster of a session. The first joiner is host; if the
/// host leaves the session ends rather than electing a replacement.
#[derive(Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    host_user_id: Option<Uuid>,
}

impl Roster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant, replacing any previous connection for the
    /// same user. The first joiner becomes host.
    pub fn join(&mut self, participant: Participant) {
        self.participants
            .retain(|p| p.user_id != participant.user_id);
        if self.host_user_id.is_none() {
            self.host_user_id = Some(participant.user_id);
        }
        self.participants.push(participant);
    }

    /// Removes a participant, returning them if present.
    pub fn remove(&mut self, user_id: Uuid) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.user_id == user_id)?;
        Some(self.participants.remove(index))
    }

    /// Looks up a participant by user id.
    #[must_use]
    pub fn get(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Looks up a participant by the character they play.
    #[must_use]
    pub fn by_character(&self, character_id: Uuid) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.profile.id == character_id)
    }

    /// Whether the user hosts this session.
    #[must_use]
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_user_id == Some(user_id)
    }

    /// Number of connected participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Whether nobody is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Roster summaries in join order.
    #[must_use]
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.participants
            .iter()
            .map(|p| ParticipantSummary {
                user_id: p.user_id,
                character_id: p.profile.id,
                character_name: p.profile.name.clone(),
                is_host: self.is_host(p.user_id),
            })
            .collect()
    }

    /// Display name for a character, or a placeholder if its player
    /// has disconnected.
    #[must_use]
    pub fn character_name(&self, character_id: Uuid) -> String {
        self.by_character(character_id)
            .map_or_else(|| "Unknown".to_owned(), |p| p.profile.name.clone())
    }

    /// Sends an event to every participant.
    pub fn broadcast(&self, event: &ServerEvent) {
        for participant in &self.participants {
            Self::deliver(participant, event.clone());
        }
    }

    /// Sends an event to every participant except one.
    pub fn broadcast_except(&self, excluded: Uuid, event: &ServerEvent) {
        for participant in &self.participants {
            if participant.user_id != excluded {
                Self::deliver(participant, event.clone());
            }
        }
    }

    /// Sends an event to a single participant, if connected.
    pub fn send_to(&self, user_id: Uuid, event: ServerEvent) {
        if let Some(participant) = self.get(user_id) {
            Self::deliver(participant, event);
        }
    }

    fn deliver(participant: &Participant, event: ServerEvent) {
        if participant.sender.send(event).is_err() {
            debug!(
                user_id = %participant.user_id,
                "dropping event for disconnected participant"
            );
        }
    }
}
