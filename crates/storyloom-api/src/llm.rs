//! HTTP-backed AI collaborators.
//!
//! The referee and narrator run as separate model-serving services; the
//! engine reaches them over plain JSON POSTs. The narrator's response
//! body is streamed and forwarded chunk by chunk as narrative tokens.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use storyloom_core::error::{AiPhase, EngineError};
use storyloom_engine::collaborators::{Judge, JudgeVerdict, Narrator, TokenStream};
use storyloom_engine::domain::action::QueuedAction;
use storyloom_engine::domain::judgment::{
    CharacterProfile, ResolvedAction, StoryEntry, WorldContext,
};
use storyloom_rules::Ability;
use tracing::instrument;

#[derive(Debug, Serialize)]
struct JudgeRequest<'a> {
    action_text: &'a str,
    action_type: Ability,
    character: &'a CharacterProfile,
    world: &'a str,
    history: &'a [StoryEntry],
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    ability: Ability,
    difficulty: i32,
    reasoning: String,
}

/// `Judge` implementation backed by a model-serving HTTP endpoint.
pub struct RemoteJudge {
    client: reqwest::Client,
    url: String,
}

impl RemoteJudge {
    /// Creates a judge that POSTs rulings requests to `url`.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

fn judgment_error(err: &reqwest::Error) -> EngineError {
    EngineError::Collaborator {
        phase: AiPhase::Judgment,
        message: err.to_string(),
    }
}

fn narrative_error(err: &reqwest::Error) -> EngineError {
    EngineError::Collaborator {
        phase: AiPhase::Narrative,
        message: err.to_string(),
    }
}

#[async_trait]
impl Judge for RemoteJudge {
    #[instrument(skip_all, fields(action_id = action.action_id))]
    async fn judge(
        &self,
        action: &QueuedAction,
        character: &CharacterProfile,
        world: &WorldContext,
        history: &[StoryEntry],
    ) -> Result<JudgeVerdict, EngineError> {
        let request = JudgeRequest {
            action_text: &action.action_text,
            action_type: action.action_type,
            character,
            world: &world.description,
            history,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| judgment_error(&e))?
            .error_for_status()
            .map_err(|e| judgment_error(&e))?
            .json::<JudgeResponse>()
            .await
            .map_err(|e| judgment_error(&e))?;
        Ok(JudgeVerdict {
            ability: response.ability,
            difficulty: response.difficulty,
            reasoning: response.reasoning,
        })
    }
}

#[derive(Debug, Serialize)]
struct NarrateRequest<'a> {
    results: &'a [ResolvedAction],
    world: &'a str,
    history: &'a [StoryEntry],
}

/// `Narrator` implementation backed by a streaming HTTP endpoint.
pub struct RemoteNarrator {
    client: reqwest::Client,
    url: String,
}

impl RemoteNarrator {
    /// Creates a narrator that POSTs narration requests to `url`.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Narrator for RemoteNarrator {
    #[instrument(skip_all, fields(action_count = results.len()))]
    async fn narrate(
        &self,
        results: &[ResolvedAction],
        world: &WorldContext,
        history: &[StoryEntry],
    ) -> Result<TokenStream, EngineError> {
        let request = NarrateRequest {
            results,
            world: &world.description,
            history,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| narrative_error(&e))?
            .error_for_status()
            .map_err(|e| narrative_error(&e))?;
        let stream = response.bytes_stream().map(|chunk| match chunk {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => Err(narrative_error(&err)),
        });
        Ok(Box::pin(stream))
    }
}
