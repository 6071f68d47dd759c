use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ssh::SshBackend;
use crate::state::AppState;
use crate::wire::{parse_message, render_reply, render_wire_error};

#[derive(Debug, Serialize, Deserialize)]
pub struct CallRequest {
    pub command: String,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallResponse {
    pub status: i32,
    pub output: String,
}

/// Run one command from a JSON request
pub async fn call_handler<B>(
    State(state): State<AppState<B>>,
    Json(request): Json<CallRequest>,
) -> Json<CallResponse>
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    let reply = state.call(request.command, request.params).await;
    Json(CallResponse {
        status: reply.status,
        output: reply.output,
    })
}

/// Handle command WebSocket connection
pub async fn command_ws_handler<B>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<B>>,
) -> Response
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    ws.on_upgrade(move |socket| command_connection(socket, state))
}

async fn command_connection<B>(socket: WebSocket, state: AppState<B>)
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    let connection_id = Uuid::new_v4();
    tracing::info!(%connection_id, "command socket opened");

    let (mut sender, mut receiver) = socket.split();

    // Messages are answered in order; the next one is read only after the
    // previous reply went out.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_message(&state, &text).await;
                if sender.send(Message::Text(reply)).await.is_err() {
                    tracing::warn!(%connection_id, "WebSocket closed before reply was sent");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%connection_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    tracing::info!(%connection_id, "command socket closed");
}

/// Decode a framed call, run it and encode the reply.
pub async fn handle_message<B>(state: &AppState<B>, message: &str) -> String
where
    B: SshBackend + Send + 'static,
    B::Handle: Send,
{
    match parse_message(message) {
        Ok(call) => render_reply(&state.call(call.name, call.params).await),
        Err(e) => {
            tracing::warn!("malformed message: {}", e);
            render_wire_error(&e)
        }
    }
}
