//! Session registry: routes commands to per-session actors, creating
//! them on first join and dropping them once their actor stops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use storyloom_core::clock::{Clock, SystemClock};
use storyloom_core::error::EngineError;
use storyloom_core::rng::SystemRng;

use crate::collaborators::{Judge, Narrator, StoryStore};
use crate::config::EngineConfig;
use crate::coordinator::{SessionCommand, SessionCoordinator, SessionDeps, SessionHandle};
use crate::domain::judgment::WorldContext;
use crate::snapshot::SessionSnapshot;

/// Shared collaborator set used for every session an engine hosts.
#[derive(Clone)]
pub struct EngineCollaborators {
    /// The AI referee.
    pub judge: Arc<dyn Judge>,
    /// The AI narrator.
    pub narrator: Arc<dyn Narrator>,
    /// The story log.
    pub store: Arc<dyn StoryStore>,
}

/// Owns the live session actors.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    collaborators: EngineCollaborators,
    config: EngineConfig,
    world: WorldContext,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Creates a registry with no live sessions.
    #[must_use]
    pub fn new(
        collaborators: EngineCollaborators,
        config: EngineConfig,
        world: WorldContext,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            collaborators,
            config,
            world,
            clock: Arc::new(SystemClock),
        }
    }

    /// Routes a command to its session's actor. Joins create the actor
    /// if the session does not exist yet; anything else targeting an
    /// unknown session is an error.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Transport` if the session does not exist
    /// (for non-join commands) or its actor has already stopped.
    pub async fn send(
        &self,
        session_id: Uuid,
        command: SessionCommand,
    ) -> Result<(), EngineError> {
        let handle = if matches!(command, SessionCommand::Join { .. }) {
            self.get_or_spawn(session_id).await
        } else {
            self.sessions
                .read()
                .await
                .get(&session_id)
                .cloned()
                .ok_or_else(|| {
                    EngineError::Transport(format!("session {session_id} is not active"))
                })?
        };
        if handle.commands.send(command).await.is_err() {
            self.sessions.write().await.remove(&session_id);
            return Err(EngineError::Transport(format!(
                "session {session_id} has closed"
            )));
        }
        Ok(())
    }

    /// The latest snapshot of a session, if it is live.
    pub async fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .map(|handle| handle.snapshot.borrow().clone())
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn get_or_spawn(&self, session_id: Uuid) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(&session_id) {
            if !handle.commands.is_closed() {
                return handle.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(&session_id) {
            if !handle.commands.is_closed() {
                return handle.clone();
            }
        }
        info!(%session_id, "spawning session actor");
        let handle = SessionCoordinator::spawn(
            session_id,
            self.world.clone(),
            self.config.clone(),
            SessionDeps {
                judge: Arc::clone(&self.collaborators.judge),
                narrator: Arc::clone(&self.collaborators.narrator),
                store: Arc::clone(&self.collaborators.store),
                clock: Arc::clone(&self.clock),
                rng: Box::new(SystemRng),
            },
        );
        sessions.insert(session_id, handle.clone());
        handle
    }
}
