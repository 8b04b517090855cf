//! Shared test mocks and utilities for the Storyloom engine.

mod clock;
mod collaborators;
mod rng;
mod store;

pub use clock::FixedClock;
pub use collaborators::{
    BrokenStreamNarrator, FailingJudge, FailingNarrator, ScriptedJudge, ScriptedNarrator,
};
pub use rng::{MockRng, SequenceRng};
pub use store::{FailingStoryStore, RecordingStoryStore};
