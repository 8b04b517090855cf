//! The session actor.
//!
//! Every session runs as one task owning all mutable round state. Socket
//! tasks and HTTP handlers talk to it exclusively through its command
//! mailbox, so two submissions for the same session can never interleave
//! mid-validation. Reads go through the watch-published snapshot and
//! never touch the mailbox.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use storyloom_core::clock::Clock;
use storyloom_core::error::{AiPhase, EngineError};
use storyloom_core::rng::DeterministicRng;
use storyloom_rules::{Ability, DC_MAX, DC_MIN, difficulty_in_bounds, effective_modifier, validate_raw_roll};

use crate::collaborators::{Judge, Narrator, StoryStore};
use crate::config::EngineConfig;
use crate::domain::action::ActionQueue;
use crate::domain::judgment::{
    CharacterProfile, Judgment, NarrativeCommit, StoryEntry, StoryRole, WorldContext,
};
use crate::domain::round::{Round, SessionPhase};
use crate::events::{ActionSummary, ClientCommand, JudgmentSummary, ServerEvent};
use crate::participant::{EventSender, Participant, Roster};
use crate::snapshot::{SessionSnapshot, round_snapshot};

use futures_util::StreamExt;

/// Commands accepted by a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// A participant connects with their character.
    Join {
        /// Joining user.
        user_id: Uuid,
        /// The character they play.
        profile: CharacterProfile,
        /// Channel their socket task drains.
        sender: EventSender,
    },
    /// A participant disconnects.
    Leave {
        /// Leaving user.
        user_id: Uuid,
    },
    /// A player declares an action.
    SubmitAction {
        /// Submitting user.
        user_id: Uuid,
        /// Acting character.
        character_id: Uuid,
        /// The declared action text.
        action_text: String,
        /// The ability the player frames the attempt under.
        action_type: Ability,
    },
    /// The host closes collection and starts judging.
    StartRound {
        /// Requesting user.
        user_id: Uuid,
    },
    /// A player answers a judgment with their d20 result.
    RollDice {
        /// Rolling user.
        user_id: Uuid,
        /// Rolling character.
        character_id: Uuid,
        /// The judgment being answered.
        judgment_id: Uuid,
        /// The raw die face.
        dice_result: i32,
    },
    /// The roller acknowledges the resolution, releasing the advance.
    AcknowledgeRoll {
        /// Acknowledging user.
        user_id: Uuid,
        /// The round index being acknowledged.
        current_index: usize,
    },
    /// The host re-invokes the referee after a judgment failure.
    RetryJudgment {
        /// Requesting user.
        user_id: Uuid,
    },
    /// The host re-runs narration after a narrative failure.
    RetryNarration {
        /// Requesting user.
        user_id: Uuid,
    },
    /// End the session. `None` means a server-side teardown.
    End {
        /// Requesting user, if client-initiated.
        user_id: Option<Uuid>,
    },
}

impl SessionCommand {
    /// The user to send a rejection to, when the command has one.
    #[must_use]
    pub fn issuer(&self) -> Option<Uuid> {
        match self {
            Self::Join { user_id, .. }
            | Self::Leave { user_id }
            | Self::SubmitAction { user_id, .. }
            | Self::StartRound { user_id }
            | Self::RollDice { user_id, .. }
            | Self::AcknowledgeRoll { user_id, .. }
            | Self::RetryJudgment { user_id }
            | Self::RetryNarration { user_id } => Some(*user_id),
            Self::End { user_id } => *user_id,
        }
    }

    /// Maps a decoded wire command onto an actor command. Joins carry
    /// the connection's event sender so the actor can talk back.
    #[must_use]
    pub fn from_client(command: ClientCommand, sender: &EventSender) -> Self {
        match command {
            ClientCommand::JoinSession {
                user_id, character, ..
            } => Self::Join {
                user_id,
                profile: character,
                sender: sender.clone(),
            },
            ClientCommand::LeaveSession { user_id, .. } => Self::Leave { user_id },
            ClientCommand::SubmitPlayerAction {
                user_id,
                character_id,
                action_text,
                action_type,
                ..
            } => Self::SubmitAction {
                user_id,
                character_id,
                action_text,
                action_type,
            },
            ClientCommand::StartRound { user_id, .. } => Self::StartRound { user_id },
            ClientCommand::RollDice {
                user_id,
                character_id,
                judgment_id,
                dice_result,
                ..
            } => Self::RollDice {
                user_id,
                character_id,
                judgment_id,
                dice_result,
            },
            ClientCommand::NextJudgment {
                user_id,
                current_index,
                ..
            } => Self::AcknowledgeRoll {
                user_id,
                current_index,
            },
            ClientCommand::RetryJudgment { user_id, .. } => Self::RetryJudgment { user_id },
            ClientCommand::RetryNarration { user_id, .. } => Self::RetryNarration { user_id },
            ClientCommand::EndSession { user_id, .. } => Self::End {
                user_id: Some(user_id),
            },
        }
    }
}

/// External dependencies a session actor is built with.
pub struct SessionDeps {
    /// The AI referee.
    pub judge: Arc<dyn Judge>,
    /// The AI narrator.
    pub narrator: Arc<dyn Narrator>,
    /// The story log.
    pub store: Arc<dyn StoryStore>,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// Die roller for timeout auto-rolls.
    pub rng: Box<dyn DeterministicRng>,
}

/// A live session's mailbox and snapshot feed.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Command mailbox.
    pub commands: mpsc::Sender<SessionCommand>,
    /// Latest published snapshot.
    pub snapshot: watch::Receiver<SessionSnapshot>,
}

/// The per-session actor state. Constructed via [`SessionCoordinator::spawn`].
pub struct SessionCoordinator {
    session_id: Uuid,
    config: EngineConfig,
    world: WorldContext,
    phase: SessionPhase,
    roster: Roster,
    queue: ActionQueue,
    pending_queue: ActionQueue,
    action_counter: u64,
    round: Option<Round>,
    judge: Arc<dyn Judge>,
    narrator: Arc<dyn Narrator>,
    store: Arc<dyn StoryStore>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn DeterministicRng>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    roll_deadline: Option<Instant>,
    narration_due: bool,
    closed: bool,
}

impl SessionCoordinator {
    /// Spawns a session actor and returns its handle.
    #[must_use]
    pub fn spawn(
        session_id: Uuid,
        world: WorldContext,
        config: EngineConfig,
        deps: SessionDeps,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::empty(session_id));
        let coordinator = Self {
            session_id,
            config,
            world,
            phase: SessionPhase::Idle,
            roster: Roster::new(),
            queue: ActionQueue::new(),
            pending_queue: ActionQueue::new(),
            action_counter: 1,
            round: None,
            judge: deps.judge,
            narrator: deps.narrator,
            store: deps.store,
            clock: deps.clock,
            rng: deps.rng,
            snapshot_tx,
            roll_deadline: None,
            narration_due: false,
            closed: false,
        };
        tokio::spawn(coordinator.run(command_rx));
        SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        info!(session_id = %self.session_id, "session actor started");
        while !self.closed {
            let command = if let Some(deadline) = self.roll_deadline {
                tokio::select! {
                    command = rx.recv() => command,
                    () = tokio::time::sleep_until(deadline) => {
                        self.handle_roll_timeout().await;
                        self.publish_snapshot();
                        continue;
                    }
                }
            } else {
                rx.recv().await
            };
            let Some(command) = command else { break };
            self.handle(command).await;
            while self.narration_due && !self.closed {
                self.narration_due = false;
                self.run_narration(&mut rx).await;
            }
            self.publish_snapshot();
        }
        info!(session_id = %self.session_id, "session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        let issuer = command.issuer();
        let result = match command {
            SessionCommand::Join {
                user_id,
                profile,
                sender,
            } => {
                self.join(user_id, profile, sender);
                Ok(())
            }
            SessionCommand::Leave { user_id } => {
                self.leave(user_id);
                Ok(())
            }
            SessionCommand::SubmitAction {
                user_id,
                character_id,
                action_text,
                action_type,
            } => self.submit_action(user_id, character_id, action_text, action_type),
            SessionCommand::StartRound { user_id } => self.start_round(user_id).await,
            SessionCommand::RollDice {
                user_id,
                character_id,
                judgment_id,
                dice_result,
            } => {
                self.roll_dice(user_id, character_id, judgment_id, dice_result)
                    .await
            }
            SessionCommand::AcknowledgeRoll {
                user_id,
                current_index,
            } => self.acknowledge_roll(user_id, current_index).await,
            SessionCommand::RetryJudgment { user_id } => self.retry_judgment(user_id).await,
            SessionCommand::RetryNarration { user_id } => self.retry_narration(user_id),
            SessionCommand::End { user_id } => self.end_session(user_id),
        };
        if let Err(err) = result {
            self.reject(issuer, &err);
        }
    }

    fn reject(&self, issuer: Option<Uuid>, err: &EngineError) {
        debug!(session_id = %self.session_id, %err, "command rejected");
        if let Some(user_id) = issuer {
            self.roster.send_to(
                user_id,
                ServerEvent::Error {
                    session_id: self.session_id,
                    message: err.to_string(),
                },
            );
        }
    }

    fn join(&mut self, user_id: Uuid, profile: CharacterProfile, sender: EventSender) {
        let character_name = profile.name.clone();
        self.roster.join(Participant {
            user_id,
            profile,
            sender,
            joined_at: self.clock.now(),
        });
        info!(
            session_id = %self.session_id,
            %user_id,
            %character_name,
            participant_count = self.roster.len(),
            "participant joined"
        );
        self.roster.send_to(
            user_id,
            ServerEvent::SessionSnapshot {
                snapshot: self.snapshot(),
            },
        );
        self.roster.broadcast(&ServerEvent::UserJoined {
            session_id: self.session_id,
            user_id,
            character_name,
            participants: self.roster.summaries(),
        });
    }

    fn leave(&mut self, user_id: Uuid) {
        let was_host = self.roster.is_host(user_id);
        let Some(participant) = self.roster.remove(user_id) else {
            return;
        };
        info!(
            session_id = %self.session_id,
            %user_id,
            participant_count = self.roster.len(),
            "participant left"
        );
        self.roster.broadcast(&ServerEvent::UserLeft {
            session_id: self.session_id,
            user_id,
            character_name: participant.profile.name,
            participants: self.roster.summaries(),
        });
        if self.roster.is_empty() {
            self.finish_session("no participants remain");
        } else if was_host {
            self.finish_session("host left the session");
        }
    }

    fn end_session(&mut self, user_id: Option<Uuid>) -> Result<(), EngineError> {
        if let Some(user_id) = user_id {
            self.roster
                .get(user_id)
                .ok_or(EngineError::UnknownParticipant { user_id })?;
            if !self.roster.is_host(user_id) {
                return Err(EngineError::NotHost { user_id });
            }
        }
        self.finish_session("ended by host");
        Ok(())
    }

    /// Discards all round state and closes the actor. Any queued
    /// actions, in-flight judgments, and unresolved rolls are dropped.
    fn finish_session(&mut self, reason: &str) {
        info!(session_id = %self.session_id, reason, "session ended");
        self.round = None;
        self.queue = ActionQueue::new();
        self.pending_queue = ActionQueue::new();
        self.roll_deadline = None;
        self.narration_due = false;
        self.phase = SessionPhase::Idle;
        self.roster.broadcast(&ServerEvent::SessionEnded {
            session_id: self.session_id,
            reason: reason.to_owned(),
        });
        self.closed = true;
    }

    fn submit_action(
        &mut self,
        user_id: Uuid,
        character_id: Uuid,
        action_text: String,
        action_type: Ability,
    ) -> Result<(), EngineError> {
        let owner = self.roster.by_character(character_id).map(|p| p.user_id);
        if owner != Some(user_id) {
            return Err(EngineError::UnknownParticipant { user_id });
        }
        let text = action_text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyActionText);
        }
        if text.chars().count() > self.config.max_action_len {
            return Err(EngineError::ActionTooLong {
                limit: self.config.max_action_len,
            });
        }
        let text = text.to_owned();
        let action_id = self.next_action_id();
        let character_name = self.roster.character_name(character_id);

        // Mid-round submissions queue for the round after this one.
        let queue = match self.phase {
            SessionPhase::Idle | SessionPhase::Collecting => &mut self.queue,
            SessionPhase::Judging | SessionPhase::AwaitingRoll | SessionPhase::Narrating => {
                &mut self.pending_queue
            }
        };
        let action = queue.enqueue(action_id, character_id, user_id, text, action_type)?;
        let summary = ActionSummary {
            action_id: action.action_id,
            character_id,
            character_name,
            order: action.order,
        };
        let queue_count = queue.len();
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Collecting;
        }
        debug!(
            session_id = %self.session_id,
            action_id,
            %character_id,
            queue_count,
            "action queued"
        );
        self.roster.broadcast(&ServerEvent::ActionSubmitted {
            session_id: self.session_id,
            action: summary,
            queue_count,
        });
        self.roster.broadcast(&ServerEvent::QueueUpdated {
            session_id: self.session_id,
            queue_count,
        });
        Ok(())
    }

    async fn start_round(&mut self, user_id: Uuid) -> Result<(), EngineError> {
        self.roster
            .get(user_id)
            .ok_or(EngineError::UnknownParticipant { user_id })?;
        if !self.roster.is_host(user_id) {
            return Err(EngineError::NotHost { user_id });
        }
        if self.phase != SessionPhase::Collecting || self.queue.is_empty() {
            return Err(EngineError::WrongPhase {
                operation: "start round",
                phase: self.phase.as_str(),
            });
        }

        // The declared actions become part of the story log before any
        // judgment is issued, so history already includes them if the
        // referee is consulted mid-round.
        let lines: Vec<String> = self
            .queue
            .actions()
            .iter()
            .map(|a| {
                format!(
                    "{}: {}",
                    self.roster.character_name(a.character_id),
                    a.action_text
                )
            })
            .collect();
        self.store
            .append_entry(
                self.session_id,
                StoryEntry {
                    role: StoryRole::Player,
                    content: lines.join("\n"),
                    created_at: self.clock.now(),
                },
            )
            .await?;

        let queue = std::mem::take(&mut self.queue);
        info!(
            session_id = %self.session_id,
            action_count = queue.len(),
            "round started"
        );
        self.round = Some(Round::new(queue));
        self.phase = SessionPhase::Judging;
        self.roster.broadcast(&ServerEvent::QueueUpdated {
            session_id: self.session_id,
            queue_count: 0,
        });
        self.judge_current().await;
        Ok(())
    }

    /// Consults the referee about the round's current action. Failures
    /// stall the round in the judging phase; `retry_judgment` re-runs.
    async fn judge_current(&mut self) {
        let Some(action) = self
            .round
            .as_ref()
            .and_then(Round::current)
            .map(|s| s.action.clone())
        else {
            return;
        };
        let profile = self
            .roster
            .by_character(action.character_id)
            .map_or_else(
                || CharacterProfile {
                    id: action.character_id,
                    name: "Unknown".to_owned(),
                    abilities: storyloom_rules::AbilityScores::default(),
                    status_effects: Vec::new(),
                },
                |p| p.profile.clone(),
            );
        let history = match self
            .store
            .recent_history(self.session_id, self.config.history_limit)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                self.ai_failure(AiPhase::Judgment, &err);
                return;
            }
        };
        debug!(
            session_id = %self.session_id,
            action_id = action.action_id,
            "consulting referee"
        );
        let verdict = match self
            .judge
            .judge(&action, &profile, &self.world, &history)
            .await
        {
            Ok(verdict) => verdict,
            Err(err) => {
                self.ai_failure(AiPhase::Judgment, &err);
                return;
            }
        };
        if !difficulty_in_bounds(verdict.difficulty) {
            warn!(
                session_id = %self.session_id,
                difficulty = verdict.difficulty,
                "referee difficulty out of bounds; clamping"
            );
        }
        let difficulty = verdict.difficulty.clamp(DC_MIN, DC_MAX);
        let judgment = Judgment {
            judgment_id: Uuid::new_v4(),
            action_id: action.action_id,
            ability: verdict.ability,
            ability_score: profile.abilities.score(verdict.ability),
            modifier: effective_modifier(&profile.abilities, verdict.ability, &profile.status_effects),
            difficulty,
            reasoning: verdict.reasoning,
        };
        if let Some(round) = self.round.as_mut() {
            if let Err(err) = round.record_judgment(judgment.clone()) {
                warn!(session_id = %self.session_id, %err, "judgment discarded");
                return;
            }
        }
        self.phase = SessionPhase::AwaitingRoll;
        self.arm_roll_deadline();
        let character_name = self.roster.character_name(action.character_id);
        self.roster.send_to(
            action.user_id,
            ServerEvent::JudgmentReady {
                session_id: self.session_id,
                judgment_id: judgment.judgment_id,
                character_id: action.character_id,
                action_text: action.action_text.clone(),
                modifier: judgment.modifier,
                difficulty: judgment.difficulty,
                difficulty_reasoning: judgment.reasoning.clone(),
            },
        );
        self.roster.broadcast_except(
            action.user_id,
            &ServerEvent::PlayerActionAnalyzed {
                session_id: self.session_id,
                judgment_id: judgment.judgment_id,
                character_id: action.character_id,
                character_name,
                action_text: action.action_text,
                modifier: judgment.modifier,
                difficulty: judgment.difficulty,
                difficulty_reasoning: judgment.reasoning,
            },
        );
    }

    async fn roll_dice(
        &mut self,
        user_id: Uuid,
        character_id: Uuid,
        judgment_id: Uuid,
        dice_result: i32,
    ) -> Result<(), EngineError> {
        let owner = self.roster.by_character(character_id).map(|p| p.user_id);
        if owner != Some(user_id) {
            return Err(EngineError::UnknownParticipant { user_id });
        }
        if self.phase != SessionPhase::AwaitingRoll {
            return Err(EngineError::WrongPhase {
                operation: "roll dice",
                phase: self.phase.as_str(),
            });
        }
        let raw = validate_raw_roll(dice_result)?;
        self.apply_roll(judgment_id, character_id, raw)?;
        self.try_advance().await;
        Ok(())
    }

    /// Resolves a validated roll: computes the outcome, broadcasts it,
    /// and buffers the server half of the advance handshake.
    fn apply_roll(
        &mut self,
        judgment_id: Uuid,
        character_id: Uuid,
        raw: u32,
    ) -> Result<(), EngineError> {
        let (roll, judgment) = {
            let round = self.round.as_mut().ok_or(EngineError::WrongPhase {
                operation: "roll dice",
                phase: self.phase.as_str(),
            })?;
            let (index, roll) = round.resolve_roll(judgment_id, character_id, raw)?;
            let judgment = round.slots()[index].judgment.clone();
            round.buffer_advance(index);
            (roll, judgment)
        };
        self.roster.broadcast(&ServerEvent::DiceRolling {
            session_id: self.session_id,
            action_id: roll.action_id,
        });
        if let Some(judgment) = judgment {
            info!(
                session_id = %self.session_id,
                action_id = roll.action_id,
                raw_roll = roll.raw_roll,
                final_value = roll.final_value,
                outcome = roll.outcome.as_str(),
                "roll resolved"
            );
            self.roster.broadcast(&ServerEvent::DiceRolled {
                session_id: self.session_id,
                judgment_id: judgment.judgment_id,
                character_id,
                character_name: self.roster.character_name(character_id),
                dice_result: roll.raw_roll,
                modifier: judgment.modifier,
                final_value: roll.final_value,
                difficulty: judgment.difficulty,
                outcome: roll.outcome,
            });
        }
        // Fresh window for the roller's acknowledgment.
        self.arm_roll_deadline();
        Ok(())
    }

    async fn acknowledge_roll(
        &mut self,
        user_id: Uuid,
        current_index: usize,
    ) -> Result<(), EngineError> {
        self.roster
            .get(user_id)
            .ok_or(EngineError::UnknownParticipant { user_id })?;
        if self.phase != SessionPhase::AwaitingRoll {
            return Err(EngineError::WrongPhase {
                operation: "acknowledge roll",
                phase: self.phase.as_str(),
            });
        }
        {
            let round = self.round.as_mut().ok_or(EngineError::WrongPhase {
                operation: "acknowledge roll",
                phase: self.phase.as_str(),
            })?;
            if current_index != round.current_index() {
                return Err(EngineError::StaleAck {
                    index: current_index,
                });
            }
            let owner = round.current().map(|s| s.action.user_id);
            if owner != Some(user_id) && !self.roster.is_host(user_id) {
                return Err(EngineError::NotActionOwner { user_id });
            }
            round.buffer_ack(current_index);
        }
        self.try_advance().await;
        Ok(())
    }

    /// Applies a completed advance handshake: moves to the next action
    /// or, after the last one, into narration.
    async fn try_advance(&mut self) {
        let advanced = match self.round.as_mut() {
            Some(round) => round.take_ready_advance(),
            None => None,
        };
        if advanced.is_none() {
            return;
        }
        self.roll_deadline = None;
        if self.round.as_ref().is_some_and(Round::is_exhausted) {
            self.roster.broadcast(&ServerEvent::AllDiceRolled {
                session_id: self.session_id,
            });
            self.phase = SessionPhase::Narrating;
            self.narration_due = true;
        } else {
            let next_index = self.round.as_ref().map_or(0, Round::current_index);
            self.phase = SessionPhase::Judging;
            self.roster.broadcast(&ServerEvent::NextJudgment {
                session_id: self.session_id,
                judgment_index: next_index,
            });
            self.judge_current().await;
        }
    }

    async fn retry_judgment(&mut self, user_id: Uuid) -> Result<(), EngineError> {
        self.roster
            .get(user_id)
            .ok_or(EngineError::UnknownParticipant { user_id })?;
        if !self.roster.is_host(user_id) {
            return Err(EngineError::NotHost { user_id });
        }
        let stalled = self.phase == SessionPhase::Judging
            && self
                .round
                .as_ref()
                .and_then(Round::current)
                .is_some_and(|s| s.judgment.is_none());
        if !stalled {
            return Err(EngineError::WrongPhase {
                operation: "retry judgment",
                phase: self.phase.as_str(),
            });
        }
        info!(session_id = %self.session_id, "retrying judgment");
        self.judge_current().await;
        Ok(())
    }

    fn retry_narration(&mut self, user_id: Uuid) -> Result<(), EngineError> {
        self.roster
            .get(user_id)
            .ok_or(EngineError::UnknownParticipant { user_id })?;
        if !self.roster.is_host(user_id) {
            return Err(EngineError::NotHost { user_id });
        }
        let failed = self.phase == SessionPhase::Narrating
            && self.round.as_ref().is_some_and(|r| r.narration_failed);
        if !failed {
            return Err(EngineError::WrongPhase {
                operation: "retry narration",
                phase: self.phase.as_str(),
            });
        }
        info!(session_id = %self.session_id, "retrying narration");
        if let Some(round) = self.round.as_mut() {
            round.narration_failed = false;
        }
        self.narration_due = true;
        Ok(())
    }

    /// Resolves the roll window's expiry: rolls on the absent player's
    /// behalf if needed, then acknowledges for them.
    async fn handle_roll_timeout(&mut self) {
        self.roll_deadline = None;
        if self.phase != SessionPhase::AwaitingRoll {
            return;
        }
        let Some((needs_roll, judgment_id, character_id)) =
            self.round.as_ref().and_then(Round::current).map(|s| {
                (
                    s.roll.is_none(),
                    s.judgment.as_ref().map(|j| j.judgment_id),
                    s.action.character_id,
                )
            })
        else {
            return;
        };
        warn!(
            session_id = %self.session_id,
            %character_id,
            "roll window elapsed; resolving on the player's behalf"
        );
        if needs_roll {
            let Some(judgment_id) = judgment_id else {
                return;
            };
            let raw = self.rng.next_u32_range(1, 20);
            if let Err(err) = self.apply_roll(judgment_id, character_id, raw) {
                error!(session_id = %self.session_id, %err, "auto-roll failed");
                return;
            }
        }
        if let Some(round) = self.round.as_mut() {
            round.buffer_ack(round.current_index());
        }
        self.try_advance().await;
    }

    /// Streams the round's narrative. The mailbox stays live through
    /// the stream: joins, leaves, next-round submissions, and session
    /// end are all handled between tokens.
    async fn run_narration(&mut self, rx: &mut mpsc::Receiver<SessionCommand>) {
        let session_id = self.session_id;
        let Some(results) = self
            .round
            .as_ref()
            .and_then(|r| r.resolved_actions(|id| self.roster.character_name(id)))
        else {
            warn!(session_id = %session_id, "narration requested with unresolved actions");
            return;
        };
        self.roster
            .broadcast(&ServerEvent::StoryGenerationStarted { session_id });
        let history = match self
            .store
            .recent_history(session_id, self.config.history_limit)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                self.ai_failure(AiPhase::Narrative, &err);
                return;
            }
        };
        let mut stream = match self.narrator.narrate(&results, &self.world, &history).await {
            Ok(stream) => stream,
            Err(err) => {
                self.ai_failure(AiPhase::Narrative, &err);
                return;
            }
        };
        let mut narrative = String::new();
        loop {
            tokio::select! {
                token = stream.next() => match token {
                    Some(Ok(token)) => {
                        narrative.push_str(&token);
                        self.roster
                            .broadcast(&ServerEvent::NarrativeToken { session_id, token });
                    }
                    Some(Err(err)) => {
                        self.ai_failure(AiPhase::Narrative, &err);
                        return;
                    }
                    None => break,
                },
                command = rx.recv() => match command {
                    Some(command) => {
                        if self.handle_during_narration(command) {
                            return;
                        }
                    }
                    None => {
                        self.closed = true;
                        return;
                    }
                },
            }
        }
        drop(stream);

        let commit = NarrativeCommit {
            session_id,
            narrative: narrative.clone(),
            results: results.clone(),
            committed_at: self.clock.now(),
        };
        if let Err(err) = self.store.commit(&commit).await {
            self.ai_failure(AiPhase::Narrative, &err);
            return;
        }
        let judgments: Vec<JudgmentSummary> = results
            .iter()
            .map(|r| JudgmentSummary {
                character_id: r.action.character_id,
                character_name: r.character_name.clone(),
                action_text: r.action.action_text.clone(),
                dice_result: r.roll.raw_roll,
                modifier: r.judgment.modifier,
                final_value: r.roll.final_value,
                difficulty: r.judgment.difficulty,
                difficulty_reasoning: r.judgment.reasoning.clone(),
                outcome: r.roll.outcome,
            })
            .collect();
        info!(
            session_id = %session_id,
            action_count = judgments.len(),
            narrative_len = narrative.len(),
            "round committed"
        );
        self.roster.broadcast(&ServerEvent::StoryGenerationComplete {
            session_id,
            narrative,
            judgments,
        });
        self.round = None;
        if self.pending_queue.is_empty() {
            self.phase = SessionPhase::Idle;
        } else {
            // Actions held back during the round open the next one.
            self.queue = std::mem::take(&mut self.pending_queue);
            self.phase = SessionPhase::Collecting;
            self.roster.broadcast(&ServerEvent::QueueUpdated {
                session_id,
                queue_count: self.queue.len(),
            });
        }
    }

    /// Handles a command that arrived between narrative tokens. Returns
    /// `true` when the session closed and streaming must stop.
    fn handle_during_narration(&mut self, command: SessionCommand) -> bool {
        let issuer = command.issuer();
        let result = match command {
            SessionCommand::Join {
                user_id,
                profile,
                sender,
            } => {
                self.join(user_id, profile, sender);
                Ok(())
            }
            SessionCommand::Leave { user_id } => {
                self.leave(user_id);
                Ok(())
            }
            SessionCommand::SubmitAction {
                user_id,
                character_id,
                action_text,
                action_type,
            } => self.submit_action(user_id, character_id, action_text, action_type),
            SessionCommand::End { user_id } => self.end_session(user_id),
            SessionCommand::StartRound { .. }
            | SessionCommand::RollDice { .. }
            | SessionCommand::AcknowledgeRoll { .. }
            | SessionCommand::RetryJudgment { .. }
            | SessionCommand::RetryNarration { .. } => Err(EngineError::WrongPhase {
                operation: "interrupt narration",
                phase: self.phase.as_str(),
            }),
        };
        if let Err(err) = result {
            self.reject(issuer, &err);
        }
        self.publish_snapshot();
        self.closed
    }

    fn ai_failure(&mut self, phase: AiPhase, err: &EngineError) {
        error!(
            session_id = %self.session_id,
            %err,
            phase = %phase,
            "AI collaborator failure"
        );
        if phase == AiPhase::Narrative {
            if let Some(round) = self.round.as_mut() {
                round.narration_failed = true;
            }
        }
        self.roster.broadcast(&ServerEvent::AiGenerationError {
            session_id: self.session_id,
            error: err.to_string(),
            phase: phase.as_str().to_owned(),
        });
    }

    fn next_action_id(&mut self) -> u64 {
        let id = self.action_counter;
        self.action_counter += 1;
        id
    }

    fn arm_roll_deadline(&mut self) {
        self.roll_deadline = self.config.roll_timeout.map(|timeout| Instant::now() + timeout);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            phase: self.phase,
            queue_count: self.queue.len(),
            pending_count: self.pending_queue.len(),
            participants: self.roster.summaries(),
            round: self
                .round
                .as_ref()
                .map(|r| round_snapshot(r, |id| self.roster.character_name(id))),
        }
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(self.snapshot());
    }
}
