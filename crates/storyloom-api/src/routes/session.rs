//! Read-only session queries.
//!
//! Queries never enter a session's mailbox; they read the actor's
//! latest published snapshot, so they stay responsive even while a
//! round is blocked on an AI collaborator.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;
use uuid::Uuid;

use storyloom_core::error::EngineError;
use storyloom_engine::snapshot::SessionSnapshot;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{session_id}
#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let snapshot = state
        .registry
        .snapshot(session_id)
        .await
        .ok_or_else(|| EngineError::Transport(format!("session {session_id} is not active")))?;
    Ok(Json(snapshot))
}

/// Returns the router for session queries.
pub fn router() -> Router<AppState> {
    Router::new().route("/{session_id}", get(get_session))
}
