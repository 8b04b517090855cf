//! Engine tunables.

use std::time::Duration;

/// Limits and timeouts applied per session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait for the current player's roll (and their
    /// advance acknowledgment) before the engine rolls on their behalf.
    /// `None` disables the timeout and waits indefinitely.
    pub roll_timeout: Option<Duration>,
    /// How many story log entries are fed back to the AI collaborators.
    pub history_limit: usize,
    /// Maximum action text length in characters.
    pub max_action_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            roll_timeout: None,
            history_limit: 20,
            max_action_len: 500,
        }
    }
}
