//! Storyloom Rules — pure d20 resolution arithmetic.
//!
//! Ability-score modifiers, roll validation, and the four-tier outcome
//! function. Everything in this crate is a pure function over its
//! arguments; no state, no I/O.

pub mod modifier;
pub mod outcome;

pub use modifier::{Ability, AbilityScores, StatusEffect, ability_modifier, effective_modifier};
pub use outcome::{
    DC_MAX, DC_MIN, RollOutcome, determine_outcome, difficulty_in_bounds, final_value,
    validate_raw_roll,
};
