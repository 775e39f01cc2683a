//! Subscriptions and the subscription registry
//!
//! A [`Subscription`] is one live attachment of a subscriber to a room's
//! message feed: the outbound delivery channel plus a termination signal.
//! The [`SubscriptionRegistry`] is the only shared mutable structure in the
//! broadcast core, a two-level map `room ID -> access token -> subscription`
//! behind a read-write lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::message::ServerMessage;
use crate::room::ChatMessage;
use crate::types::{AccessToken, RoomId};

/// Upper bound on a single delivery push
///
/// A subscriber whose outbound channel stays full this long fails its
/// delivery instead of stalling the whole broadcast join.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// One live attachment to a room's message feed
///
/// Exclusively owned by the registry while active; the attaching call keeps
/// a non-owning clone to wait on the termination signal.
#[derive(Debug)]
pub struct Subscription {
    /// Owning room
    room_id: RoomId,
    /// Key distinguishing this subscriber within the room
    token: AccessToken,
    /// Outbound delivery channel to the remote peer
    sender: mpsc::Sender<ServerMessage>,
    /// Termination signal, distinct from the delivery channel
    closed: CancellationToken,
}

impl Subscription {
    /// Create a subscription wrapping the caller's delivery channel and a
    /// fresh termination signal
    pub fn new(room_id: RoomId, token: AccessToken, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            room_id,
            token,
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// The room this subscription belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The access token keying this subscription
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Push one message to the subscriber
    ///
    /// Bounded by [`DELIVERY_TIMEOUT`]; a closed or persistently full channel
    /// yields a delivery error.
    pub async fn deliver(&self, message: &ChatMessage) -> Result<(), AppError> {
        let event = ServerMessage::Message {
            room_id: message.room_id.to_string(),
            text: message.text.clone(),
        };
        self.sender
            .send_timeout(event, DELIVERY_TIMEOUT)
            .await
            .map_err(|e| AppError::Delivery {
                token: self.token.to_string(),
                reason: match e {
                    mpsc::error::SendTimeoutError::Timeout(_) => "push timed out".to_string(),
                    mpsc::error::SendTimeoutError::Closed(_) => "channel closed".to_string(),
                },
            })
    }

    /// Fire the termination signal
    ///
    /// Idempotent: racing detach requests both land here safely and the
    /// session wait observes the signal once.
    pub fn terminate(&self) {
        self.closed.cancel();
    }

    /// Resolve when the termination signal fires
    pub async fn terminated(&self) {
        self.closed.cancelled().await;
    }
}

/// Thread-safe registry of active subscriptions, per room
///
/// Two-level mapping `RoomId -> AccessToken -> Subscription`. Mutations are
/// mutually exclusive; reads run concurrently with reads. A (room, token)
/// pair maps to at most one live subscription; adding over an existing pair
/// overwrites it without error.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    map_by_room_and_token: RwLock<HashMap<RoomId, HashMap<AccessToken, Arc<Subscription>>>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription under its (room, token) pair
    ///
    /// Lazily allocates the room's inner map.
    pub async fn add(&self, subscription: Arc<Subscription>) {
        let mut map = self.map_by_room_and_token.write().await;
        map.entry(subscription.room_id().clone())
            .or_default()
            .insert(subscription.token().clone(), subscription);
    }

    /// Delete the entry for (room, token) if present; no-op if absent
    pub async fn remove(&self, room_id: &RoomId, token: &AccessToken) {
        let mut map = self.map_by_room_and_token.write().await;
        if let Some(inner) = map.get_mut(room_id) {
            inner.remove(token);
            if inner.is_empty() {
                map.remove(room_id);
            }
        }
    }

    /// The current subscription for (room, token), if any
    pub async fn get(&self, room_id: &RoomId, token: &AccessToken) -> Option<Arc<Subscription>> {
        let map = self.map_by_room_and_token.read().await;
        map.get(room_id).and_then(|inner| inner.get(token)).cloned()
    }

    /// Snapshot of all subscriptions registered for a room
    pub async fn list(&self, room_id: &RoomId) -> Vec<Arc<Subscription>> {
        let map = self.map_by_room_and_token.read().await;
        map.get(room_id)
            .map(|inner| inner.values().cloned().collect())
            .unwrap_or_default()
    }
}
