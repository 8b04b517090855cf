//! WebSocket handling for player connections.
//!
//! Each connection gets an unbounded event channel the session actor
//! writes into; a forward task drains it onto the socket. Incoming
//! frames decode to wire commands and go straight to the targeted
//! session's mailbox.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::{Router, routing::get};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use storyloom_engine::coordinator::SessionCommand;
use storyloom_engine::events::{ClientCommand, ServerEvent};

use crate::state::AppState;

/// Returns the WebSocket router.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler — entry point for new connections.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    info!(%connection_id, "WebSocket connection established");

    // Forward engine events from the channel onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // The session and user this connection joined as, for cleanup when
    // the socket drops without an explicit leave.
    let mut joined: Option<(Uuid, Uuid)> = None;

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    let session_id = command.session_id();
                    if let ClientCommand::JoinSession { user_id, .. } = &command {
                        joined = Some((session_id, *user_id));
                    }
                    let leaving = matches!(command, ClientCommand::LeaveSession { .. });
                    let actor_command = SessionCommand::from_client(command, &tx);
                    if let Err(err) = state.registry.send(session_id, actor_command).await {
                        warn!(%connection_id, %err, "command not delivered");
                        let _ = tx.send(ServerEvent::Error {
                            session_id,
                            message: err.to_string(),
                        });
                    } else if leaving {
                        joined = None;
                    }
                }
                Err(err) => {
                    warn!(%connection_id, %err, "failed to parse client command");
                    let _ = tx.send(ServerEvent::Error {
                        session_id: Uuid::nil(),
                        message: format!("invalid message format: {err}"),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                info!(%connection_id, "WebSocket closed by client");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%connection_id, %err, "WebSocket error");
                break;
            }
        }
    }

    if let Some((session_id, user_id)) = joined {
        let _ = state
            .registry
            .send(session_id, SessionCommand::Leave { user_id })
            .await;
    }
    send_task.abort();

    info!(%connection_id, "WebSocket connection terminated");
}
