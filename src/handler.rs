//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, message
//! parsing, and dispatch to the `ChatService`. The connection owns a
//! cancellation token that models the connection context; room sessions
//! started over this connection run on child tokens and unblock when the
//! socket goes away.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::service::ChatService;
use crate::types::{AccessToken, RoomId};

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle. All outbound traffic — request
/// replies and joined-room feeds alike — goes through one mpsc channel
/// drained by the write task.
pub async fn handle_connection(
    stream: TcpStream,
    service: Arc<ChatService>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    info!("Client connected from {}", peer_addr);

    // Channel for server -> client messages; clones of this sender are the
    // delivery handles registered with joined rooms
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(32);

    // The connection context. Cancelled when the socket ends, which releases
    // every room session opened over this connection.
    let conn_ctx = CancellationToken::new();

    // Spawn read task (WebSocket -> dispatch)
    let read_service = service.clone();
    let read_tx = msg_tx.clone();
    let read_ctx = conn_ctx.clone();
    let read_peer = peer_addr.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            dispatch(&read_service, &read_tx, &read_ctx, client_msg).await;
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", read_peer, e);
                            let _ = read_tx.send(AppError::Json(e).into()).await;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", read_peer);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    debug!("Ping from {}", read_peer);
                    // Pong is handled automatically by tungstenite
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", read_peer);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", read_peer, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", read_peer);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", peer_addr);
        }
        _ = write_task => {
            debug!("Write task completed for {}", peer_addr);
        }
    }

    // The connection context ends here; every session this connection
    // opened observes it and deregisters.
    conn_ctx.cancel();

    info!("Client {} disconnected", peer_addr);

    Ok(())
}

/// Dispatch one client request to the service and queue the reply
///
/// `JoinRoom` is long-lived: the session blocks until an explicit leave or
/// connection close, so it runs in its own task and the read loop keeps
/// serving requests on this connection. The feed itself acknowledges the
/// join; a `Left` event marks its normal end.
async fn dispatch(
    service: &Arc<ChatService>,
    reply: &mpsc::Sender<ServerMessage>,
    conn_ctx: &CancellationToken,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::CreateRoom { name } => {
            let response = match service.create_room(name).await {
                Ok(room) => ServerMessage::RoomCreated {
                    room_id: room.id.to_string(),
                    name: room.name,
                },
                Err(err) => err.into(),
            };
            let _ = reply.send(response).await;
        }
        ClientMessage::ListRooms => {
            let response = match service.rooms().await {
                Ok(rooms) => ServerMessage::Rooms { rooms },
                Err(err) => err.into(),
            };
            let _ = reply.send(response).await;
        }
        ClientMessage::GetToken => {
            let response = match service.issue_token().await {
                Ok(token) => ServerMessage::Token {
                    token: token.to_string(),
                },
                Err(err) => err.into(),
            };
            let _ = reply.send(response).await;
        }
        ClientMessage::JoinRoom { room_id, token } => {
            let service = service.clone();
            let sender = reply.clone();
            let session_ctx = conn_ctx.child_token();
            let room_id = RoomId::from_string(room_id);
            let token = AccessToken::from_string(token);
            tokio::spawn(async move {
                match service
                    .join_room(&room_id, token, sender.clone(), session_ctx)
                    .await
                {
                    Ok(()) => {
                        let _ = sender
                            .send(ServerMessage::Left {
                                room_id: room_id.to_string(),
                            })
                            .await;
                    }
                    Err(err) => {
                        let _ = sender.send(err.into()).await;
                    }
                }
            });
        }
        ClientMessage::LeaveRoom { room_id, token } => {
            // Always succeeds; leaving an absent subscription is a no-op.
            // The attached session reports its own end with a Left event.
            service
                .leave_room(
                    &RoomId::from_string(room_id),
                    &AccessToken::from_string(token),
                )
                .await;
        }
        ClientMessage::PostMessage { room_id, text } => {
            let response = match service
                .post_message(&RoomId::from_string(room_id), text)
                .await
            {
                Ok(message) => ServerMessage::Posted {
                    room_id: message.room_id.to_string(),
                    text: message.text,
                },
                Err(err) => err.into(),
            };
            let _ = reply.send(response).await;
        }
        ClientMessage::ListMessages { room_id } => {
            let room_id = RoomId::from_string(room_id);
            let response = match service.messages(&room_id).await {
                Ok(messages) => ServerMessage::Messages {
                    room_id: room_id.to_string(),
                    messages,
                },
                Err(err) => err.into(),
            };
            let _ = reply.send(response).await;
        }
    }
}
