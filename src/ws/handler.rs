//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::routes::AppError;
use crate::relay::RelayHub;
use crate::ws::protocol::{decode_client_msg, RelayMsg};

/// WebSocket upgrade handler for `/api/ws/:game_id/:player_id`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((game_id, player_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Response {
    // Unknown games/players get a plain HTTP error; the seat is only
    // attached once the upgrade completes
    match state.relay.check_seat(game_id, player_id) {
        Ok(()) => {
            info!(game_id = %game_id, player_id = %player_id, "WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_socket(socket, game_id, player_id, state))
        }
        Err(e) => {
            warn!(game_id = %game_id, player_id = %player_id, error = %e, "WebSocket connect rejected");
            AppError::from(e).into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    game_id: Uuid,
    player_id: Uuid,
    state: AppState,
) {
    let relay_rx = match state.relay.connect(game_id, player_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(game_id = %game_id, player_id = %player_id, error = %e, "Seat vanished before upgrade completed");
            return;
        }
    };

    run_session(&state.relay, game_id, player_id, socket, relay_rx).await;

    // Cleanup on disconnect
    state.relay.disconnect(game_id, player_id).await;

    info!(game_id = %game_id, player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    relay: &RelayHub,
    game_id: Uuid,
    player_id: Uuid,
    socket: WebSocket,
    mut relay_rx: mpsc::Receiver<RelayMsg>,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Spawn writer task: relay -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = relay_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> relay
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match decode_client_msg(&text) {
                Ok(client_msg) => {
                    if let Err(e) = relay.handle(game_id, player_id, client_msg).await {
                        warn!(game_id = %game_id, player_id = %player_id, error = %e, "Relay rejected message");
                    }
                }
                Err(e) => {
                    warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &RelayMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
