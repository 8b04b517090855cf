//! Wall-clock seam.
//!
//! Narrative commits and story-log entries are timestamped through this
//! trait so tests can pin time rather than read the host clock.

use chrono::{DateTime, Utc};

/// Source of commit timestamps.
pub trait Clock: Send + Sync {
    /// The current moment.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the host clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
