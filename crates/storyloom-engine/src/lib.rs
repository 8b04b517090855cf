//! Storyloom Engine — round orchestration for AI-narrated tabletop
//! sessions.
//!
//! A session moves through a fixed loop: players declare actions, an AI
//! referee rules on each one in turn, the affected player rolls a d20,
//! and once every action has resolved an AI narrator streams the
//! round's story. Each session runs as a single actor task; this crate
//! owns that actor, its domain state, and the wire message types, and
//! leaves the AI and storage implementations behind trait seams.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod events;
pub mod participant;
pub mod registry;
pub mod snapshot;
