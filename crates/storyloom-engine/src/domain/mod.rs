//! Domain state for a session: the action queue, the round in flight,
//! and the value types produced as it resolves.

pub mod action;
pub mod judgment;
pub mod round;
