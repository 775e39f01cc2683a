//! Persistence collaborators
//!
//! The broadcast core treats room and message persistence as external
//! keyed-map stores behind trait seams. The in-memory implementations here
//! are the process-lifetime variants used by the server binary and the
//! tests; a store miss is an `Ok(None)` / empty result, never an error.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::room::{ChatMessage, Room};
use crate::types::RoomId;

/// Room persistence
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert a room, overwriting any previous room with the same ID
    async fn insert(&self, room: Room) -> Result<(), AppError>;
    /// Look up a room by ID; absence is `Ok(None)`, not an error
    async fn select(&self, id: &RoomId) -> Result<Option<Room>, AppError>;
    /// All rooms, in no particular order
    async fn select_all(&self) -> Result<Vec<Room>, AppError>;
}

/// Message persistence
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message
    async fn insert(&self, message: ChatMessage) -> Result<(), AppError>;
    /// All messages posted to a room, in insertion order
    async fn select_by_room_id(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, AppError>;
}

/// In-memory [`RoomStore`] keyed by room ID
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    map_by_id: RwLock<HashMap<RoomId, Room>>,
}

impl InMemoryRoomStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert(&self, room: Room) -> Result<(), AppError> {
        self.map_by_id.write().await.insert(room.id.clone(), room);
        Ok(())
    }

    async fn select(&self, id: &RoomId) -> Result<Option<Room>, AppError> {
        Ok(self.map_by_id.read().await.get(id).cloned())
    }

    async fn select_all(&self) -> Result<Vec<Room>, AppError> {
        Ok(self.map_by_id.read().await.values().cloned().collect())
    }
}

/// In-memory [`MessageStore`] keyed by room ID
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    map_by_room_id: RwLock<HashMap<RoomId, Vec<ChatMessage>>>,
}

impl InMemoryMessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: ChatMessage) -> Result<(), AppError> {
        self.map_by_room_id
            .write()
            .await
            .entry(message.room_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn select_by_room_id(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, AppError> {
        Ok(self
            .map_by_room_id
            .read()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}
