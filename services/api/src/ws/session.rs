//! Manages the WebSocket connection lifecycle for a call with a companion.

use super::{
    protocol::{ClientMessage, ServerMessage, UserAction},
    relay::{RelayVoiceClient, SdkCommand},
};
use crate::{
    handlers::{ApiError, caller_identity},
    history::HistoryRecorder,
    state::AppState,
};
use anyhow::Result;
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use companion_core::call::{CallProfile, CallSessionController};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

const DEFAULT_VOICE: &str = "female";

#[derive(Deserialize, Debug, Default)]
pub struct CallParams {
    /// `male` or `female`.
    pub voice: Option<String>,
}

/// Axum handler that resolves the companion, then upgrades to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<CallParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let companion = state
        .service
        .get_companion(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Companion with id '{}' not found", id)))?;

    let profile = CallProfile {
        companion_id: companion.id,
        subject: companion.subject,
        topic: companion.topic,
        style: companion.style,
        voice: params.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
    };
    let user_id = caller_identity(&headers).0;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, profile, user_id)))
}

/// Runs one call: every text frame is applied to the controller, followed by
/// the SDK commands it produced and the resulting state.
#[instrument(name = "call_session", skip_all, fields(connection_id, companion_id = %profile.companion_id))]
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    profile: CallProfile,
    user_id: Option<String>,
) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", temp_id);
    info!(?user_id, "New call connection.");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (client, mut commands) = RelayVoiceClient::new();
    let client = Arc::new(client);
    let recorder = Arc::new(HistoryRecorder::new(state.history.clone(), user_id));
    let controller = CallSessionController::attach(profile, client.clone(), recorder);

    if send_msg(&mut socket_tx, ServerMessage::State(controller.snapshot()))
        .await
        .is_err()
    {
        error!("Failed to send the initial state to the client.");
        return;
    }

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = apply_client_message(&controller, &client, &text);
                if let Err(e) = flush(&mut socket_tx, &mut commands, reply, &controller).await {
                    error!(error = ?e, "Failed to send to client WebSocket.");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Ending call session.");
                break;
            }
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame; audio stays in the browser."),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    info!(call_state = %controller.call_state(), "Call connection closed.");
}

/// Applies one client frame to the controller, returning a message for the
/// client when the frame is malformed or the action is rejected.
fn apply_client_message(
    controller: &CallSessionController,
    client: &RelayVoiceClient,
    text: &str,
) -> Option<ServerMessage> {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed client message.");
            return Some(ServerMessage::Error {
                message: format!("Malformed message: {}", e),
            });
        }
    };

    match msg.into_event() {
        Ok(event) => {
            client.deliver(&event);
            None
        }
        Err(UserAction::StartSession) => controller
            .start_session()
            .err()
            .map(|e| ServerMessage::Error {
                message: e.to_string(),
            }),
        Err(UserAction::EndSession) => {
            controller.end_session();
            None
        }
        Err(UserAction::ToggleMicrophone) => {
            controller.toggle_microphone();
            None
        }
    }
}

/// Sends the queued SDK commands, the optional reply, then the state.
async fn flush(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    commands: &mut mpsc::UnboundedReceiver<SdkCommand>,
    reply: Option<ServerMessage>,
    controller: &CallSessionController,
) -> Result<()> {
    while let Ok(command) = commands.try_recv() {
        send_msg(socket_tx, command.into()).await?;
    }
    if let Some(reply) = reply {
        send_msg(socket_tx, reply).await?;
    }
    send_msg(socket_tx, ServerMessage::State(controller.snapshot())).await
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
