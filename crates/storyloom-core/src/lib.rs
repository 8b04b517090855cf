//! Storyloom Core — shared abstractions.
//!
//! This crate defines the error taxonomy and the determinism seams (clock,
//! RNG) that every other crate depends on. It contains no infrastructure
//! code.

pub mod clock;
pub mod error;
pub mod rng;
