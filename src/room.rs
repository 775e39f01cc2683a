//! Room and message entities
//!
//! Plain immutable domain data: a named room and the messages posted to it.
//! Both are created through the [`ChatService`](crate::service::ChatService)
//! and retained by the stores.

use serde::{Deserialize, Serialize};

use crate::types::RoomId;

/// A named chat room
///
/// Identity is the opaque ID issued at creation; the display name is free
/// text chosen by the creator. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Opaque room identifier
    pub id: RoomId,
    /// Display name
    pub name: String,
}

impl Room {
    /// Create a new room with the given ID and name
    pub fn new(id: RoomId, name: String) -> Self {
        Self { id, name }
    }
}

/// A message posted to a room
///
/// Belongs to exactly one room. Immutable after posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The room this message was posted to
    pub room_id: RoomId,
    /// Message body
    pub text: String,
}

impl ChatMessage {
    /// Create a new message for the given room
    pub fn new(room_id: RoomId, text: String) -> Self {
        Self { room_id, text }
    }
}
