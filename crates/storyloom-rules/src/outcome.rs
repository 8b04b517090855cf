//! Roll outcome determination.

use serde::{Deserialize, Serialize};
use storyloom_core::error::EngineError;

/// Lowest difficulty class the Judge may assign.
pub const DC_MIN: i32 = 5;
/// Highest difficulty class the Judge may assign.
pub const DC_MAX: i32 = 30;

/// Four-tier outcome of a judged roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollOutcome {
    /// Natural 1 — automatic, regardless of the numeric comparison.
    CriticalFailure,
    /// Final value below the difficulty class.
    Failure,
    /// Final value met or exceeded the difficulty class.
    Success,
    /// Natural 20 — automatic, regardless of the numeric comparison.
    CriticalSuccess,
}

impl RollOutcome {
    /// Returns the wire name for this outcome.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalFailure => "critical_failure",
            Self::Failure => "failure",
            Self::Success => "success",
            Self::CriticalSuccess => "critical_success",
        }
    }
}

/// Returns true when a Judge-assigned difficulty is within `[DC_MIN, DC_MAX]`.
#[must_use]
pub fn difficulty_in_bounds(difficulty: i32) -> bool {
    (DC_MIN..=DC_MAX).contains(&difficulty)
}

/// Validates a client-submitted raw roll against the d20 range.
///
/// # Errors
///
/// Returns `EngineError::InvalidRoll` when `value` is outside `1..=20`.
pub fn validate_raw_roll(value: i32) -> Result<u32, EngineError> {
    if (1..=20).contains(&value) {
        #[allow(clippy::cast_sign_loss)]
        Ok(value as u32)
    } else {
        Err(EngineError::InvalidRoll { value })
    }
}

/// The value compared against the difficulty class: raw roll plus modifier.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn final_value(raw_roll: u32, modifier: i32) -> i32 {
    raw_roll as i32 + modifier
}

/// Determines the outcome of a judged roll.
///
/// A natural 1 or 20 takes precedence over the numeric comparison; otherwise
/// the outcome is `Success` iff `raw_roll + modifier >= difficulty`.
#[must_use]
pub fn determine_outcome(raw_roll: u32, modifier: i32, difficulty: i32) -> RollOutcome {
    if raw_roll == 1 {
        return RollOutcome::CriticalFailure;
    }
    if raw_roll == 20 {
        return RollOutcome::CriticalSuccess;
    }
    if final_value(raw_roll, modifier) >= difficulty {
        RollOutcome::Success
    } else {
        RollOutcome::Failure
    }
}
