//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::room::{ChatMessage, Room};

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new room with a display name
    CreateRoom { name: String },
    /// List all rooms
    ListRooms,
    /// Request an access token for joining a room feed
    GetToken,
    /// Attach to a room's live feed
    JoinRoom { room_id: String, token: String },
    /// Detach from a room's live feed
    LeaveRoom { room_id: String, token: String },
    /// Post a message to a room
    PostMessage { room_id: String, text: String },
    /// List all messages posted to a room
    ListMessages { room_id: String },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room created successfully
    RoomCreated { room_id: String, name: String },
    /// Room listing
    Rooms { rooms: Vec<Room> },
    /// Access token issued
    Token { token: String },
    /// A joined feed ended (explicit leave or connection close)
    Left { room_id: String },
    /// A message broadcast on a joined room's feed
    Message { room_id: String, text: String },
    /// Message posted and broadcast successfully
    Posted { room_id: String, text: String },
    /// Message history for a room
    Messages {
        room_id: String,
        messages: Vec<ChatMessage>,
    },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Non-existent room ID
    RoomNotFound,
    /// Store insert/select failed
    StoreFailure,
    /// Delivery to at least one subscriber failed
    DeliveryFailed,
    /// ID generation failed
    GenerationFailed,
    /// Invalid message format
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::RoomNotFound(room_id) => {
                (ErrorCode::RoomNotFound, format!("Room '{}' not found", room_id))
            }
            AppError::Persistence(reason) => {
                (ErrorCode::StoreFailure, format!("Store failure: {}", reason))
            }
            AppError::Delivery { token, reason } => (
                ErrorCode::DeliveryFailed,
                format!("Delivery to subscriber '{}' failed: {}", token, reason),
            ),
            AppError::IdGeneration(reason) => (
                ErrorCode::GenerationFailed,
                format!("ID generation failed: {}", reason),
            ),
            AppError::Json(e) => {
                (ErrorCode::InvalidMessage, format!("Invalid message format: {}", e))
            }
            // Fatal errors are not typically converted (connection closes)
            _ => {
                (ErrorCode::InvalidMessage, "Internal error".to_string())
            }
        };
        ServerMessage::Error { code, message }
    }
}
