//! Shared application state.

use std::sync::Arc;

use storyloom_engine::registry::SessionRegistry;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The live session actors.
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}
