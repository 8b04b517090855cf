//! Test collaborators — scripted `Judge` and `Narrator` implementations.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use storyloom_core::error::{AiPhase, EngineError};
use storyloom_engine::collaborators::{Judge, JudgeVerdict, Narrator, TokenStream};
use storyloom_engine::domain::action::QueuedAction;
use storyloom_engine::domain::judgment::{
    CharacterProfile, ResolvedAction, StoryEntry, WorldContext,
};
use storyloom_rules::Ability;

/// A judge that replies from a script and records every action it was
/// asked about, in call order.
#[derive(Debug)]
pub struct ScriptedJudge {
    script: Mutex<VecDeque<JudgeVerdict>>,
    fallback: JudgeVerdict,
    judged: Mutex<Vec<u64>>,
}

impl ScriptedJudge {
    /// A judge that always returns the same verdict.
    #[must_use]
    pub fn constant(verdict: JudgeVerdict) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: verdict,
            judged: Mutex::new(Vec::new()),
        }
    }

    /// A judge that replies from `verdicts` in order, then falls back
    /// to `fallback` once the script is exhausted.
    #[must_use]
    pub fn sequence(verdicts: Vec<JudgeVerdict>, fallback: JudgeVerdict) -> Self {
        Self {
            script: Mutex::new(verdicts.into()),
            fallback,
            judged: Mutex::new(Vec::new()),
        }
    }

    /// A convenience verdict: dexterity at the given difficulty.
    #[must_use]
    pub fn verdict(difficulty: i32) -> JudgeVerdict {
        JudgeVerdict {
            ability: Ability::Dexterity,
            difficulty,
            reasoning: "a routine test".to_owned(),
        }
    }

    /// Action ids judged so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn judged_actions(&self) -> Vec<u64> {
        self.judged.lock().unwrap().clone()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(
        &self,
        action: &QueuedAction,
        _character: &CharacterProfile,
        _world: &WorldContext,
        _history: &[StoryEntry],
    ) -> Result<JudgeVerdict, EngineError> {
        self.judged.lock().unwrap().push(action.action_id);
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// A judge whose calls always fail, optionally recovering after a set
/// number of failures.
#[derive(Debug)]
pub struct FailingJudge {
    failures_left: Mutex<Option<u32>>,
    recovery: JudgeVerdict,
}

impl FailingJudge {
    /// A judge that fails every call.
    #[must_use]
    pub fn always() -> Self {
        Self {
            failures_left: Mutex::new(None),
            recovery: ScriptedJudge::verdict(10),
        }
    }

    /// A judge that fails `failures` calls, then returns `recovery`.
    #[must_use]
    pub fn until_recovered(failures: u32, recovery: JudgeVerdict) -> Self {
        Self {
            failures_left: Mutex::new(Some(failures)),
            recovery,
        }
    }
}

#[async_trait]
impl Judge for FailingJudge {
    async fn judge(
        &self,
        _action: &QueuedAction,
        _character: &CharacterProfile,
        _world: &WorldContext,
        _history: &[StoryEntry],
    ) -> Result<JudgeVerdict, EngineError> {
        let mut failures_left = self.failures_left.lock().unwrap();
        match failures_left.as_mut() {
            Some(0) => Ok(self.recovery.clone()),
            Some(n) => {
                *n -= 1;
                Err(EngineError::Collaborator {
                    phase: AiPhase::Judgment,
                    message: "judge unavailable".to_owned(),
                })
            }
            None => Err(EngineError::Collaborator {
                phase: AiPhase::Judgment,
                message: "judge unavailable".to_owned(),
            }),
        }
    }
}

/// A narrator that streams a fixed token script and records how many
/// resolved actions each call was given.
#[derive(Debug)]
pub struct ScriptedNarrator {
    tokens: Vec<String>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedNarrator {
    /// Creates a narrator that streams `tokens` on every call.
    #[must_use]
    pub fn new(tokens: Vec<&str>) -> Self {
        Self {
            tokens: tokens.into_iter().map(str::to_owned).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Resolved-action counts passed to each `narrate` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn narrate(
        &self,
        results: &[ResolvedAction],
        _world: &WorldContext,
        _history: &[StoryEntry],
    ) -> Result<TokenStream, EngineError> {
        self.calls.lock().unwrap().push(results.len());
        let tokens: Vec<Result<String, EngineError>> =
            self.tokens.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(tokens)))
    }
}

/// A narrator that fails to open a stream, optionally recovering into a
/// working script after a set number of failures.
#[derive(Debug)]
pub struct FailingNarrator {
    failures_left: Mutex<Option<u32>>,
    recovery: Vec<String>,
}

impl FailingNarrator {
    /// A narrator that fails every call.
    #[must_use]
    pub fn always() -> Self {
        Self {
            failures_left: Mutex::new(None),
            recovery: Vec::new(),
        }
    }

    /// A narrator that fails `failures` calls, then streams `recovery`.
    #[must_use]
    pub fn until_recovered(failures: u32, recovery: Vec<&str>) -> Self {
        Self {
            failures_left: Mutex::new(Some(failures)),
            recovery: recovery.into_iter().map(str::to_owned).collect(),
        }
    }
}

#[async_trait]
impl Narrator for FailingNarrator {
    async fn narrate(
        &self,
        _results: &[ResolvedAction],
        _world: &WorldContext,
        _history: &[StoryEntry],
    ) -> Result<TokenStream, EngineError> {
        let mut failures_left = self.failures_left.lock().unwrap();
        let failed = match failures_left.as_mut() {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        };
        if failed {
            return Err(EngineError::Collaborator {
                phase: AiPhase::Narrative,
                message: "narrator unavailable".to_owned(),
            });
        }
        let tokens: Vec<Result<String, EngineError>> =
            self.recovery.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(tokens)))
    }
}

/// A narrator whose stream yields some tokens and then breaks.
#[derive(Debug)]
pub struct BrokenStreamNarrator {
    tokens_before_failure: Vec<String>,
}

impl BrokenStreamNarrator {
    /// Creates a narrator that streams `tokens` and then errors.
    #[must_use]
    pub fn new(tokens: Vec<&str>) -> Self {
        Self {
            tokens_before_failure: tokens.into_iter().map(str::to_owned).collect(),
        }
    }
}

#[async_trait]
impl Narrator for BrokenStreamNarrator {
    async fn narrate(
        &self,
        _results: &[ResolvedAction],
        _world: &WorldContext,
        _history: &[StoryEntry],
    ) -> Result<TokenStream, EngineError> {
        let mut items: Vec<Result<String, EngineError>> = self
            .tokens_before_failure
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        items.push(Err(EngineError::Collaborator {
            phase: AiPhase::Narrative,
            message: "stream interrupted".to_owned(),
        }));
        Ok(Box::pin(stream::iter(items)))
    }
}
