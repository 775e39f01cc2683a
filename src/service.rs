//! Chat service: room operations, message broadcast, session lifecycle
//!
//! `ChatService` owns the subscription registry and drives the three moving
//! parts of the live-room feature:
//! - room/message operations backed by the injected stores
//! - `post_message`, which persists a message and fans it out concurrently
//!   to every current subscriber of the room
//! - `join_room`/`leave_room`, the attach/detach lifecycle of one subscriber

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::message::ServerMessage;
use crate::room::{ChatMessage, Room};
use crate::store::{MessageStore, RoomStore};
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::types::{AccessToken, IdGenerator, RoomId};

/// The chat service
///
/// Cheap to share: handlers hold it in an `Arc` and call it concurrently.
/// The registry is the only mutable state; the stores and ID generator are
/// injected collaborators.
pub struct ChatService {
    ids: Arc<dyn IdGenerator>,
    rooms: Arc<dyn RoomStore>,
    messages: Arc<dyn MessageStore>,
    registry: SubscriptionRegistry,
}

impl ChatService {
    /// Create a service over the given collaborators
    pub fn new(
        ids: Arc<dyn IdGenerator>,
        rooms: Arc<dyn RoomStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            ids,
            rooms,
            messages,
            registry: SubscriptionRegistry::new(),
        }
    }

    /// Create a room with a freshly generated ID
    pub async fn create_room(&self, name: String) -> Result<Room, AppError> {
        let id = self.ids.generate()?;
        let room = Room::new(RoomId::from_string(id), name);
        self.rooms.insert(room.clone()).await?;
        info!(room_id = %room.id, name = %room.name, "room created");
        Ok(room)
    }

    /// All rooms
    pub async fn rooms(&self) -> Result<Vec<Room>, AppError> {
        self.rooms.select_all().await
    }

    /// Look up a room; absence is `Ok(None)`
    pub async fn room(&self, id: &RoomId) -> Result<Option<Room>, AppError> {
        self.rooms.select(id).await
    }

    /// Issue a one-time access token for joining a room feed
    pub async fn issue_token(&self) -> Result<AccessToken, AppError> {
        Ok(AccessToken::from_string(self.ids.generate()?))
    }

    /// Message history of a room, in posting order
    pub async fn messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, AppError> {
        self.messages.select_by_room_id(room_id).await
    }

    /// Post a message and broadcast it to every current subscriber of the room
    ///
    /// The message is persisted first; a store failure aborts before any
    /// delivery. Deliveries run concurrently, one per subscriber, and all of
    /// them are awaited even when some fail. The first failure becomes the
    /// broadcast's error; deliveries that already succeeded stand.
    pub async fn post_message(&self, room_id: &RoomId, text: String) -> Result<ChatMessage, AppError> {
        let room = self.require_room(room_id).await?;

        let message = ChatMessage::new(room.id.clone(), text);
        self.messages.insert(message.clone()).await?;

        // Snapshot, then deliver. A subscriber detaching after the snapshot
        // may still receive this message; that race is accepted.
        let subscribers = self.registry.list(&room.id).await;
        debug!(room_id = %room.id, subscribers = subscribers.len(), "broadcasting message");

        let results = join_all(subscribers.iter().map(|sub| sub.deliver(&message))).await;
        for result in results {
            if let Err(err) = result {
                error!(room_id = %room.id, %err, "broadcast delivery failed");
                return Err(err);
            }
        }

        Ok(message)
    }

    /// Attach to a room's live feed and block until the session ends
    ///
    /// Registers a subscription wrapping `sender` and waits for either the
    /// connection context `ctx` to be cancelled or an explicit
    /// [`leave_room`](Self::leave_room) for the same (room, token). The
    /// registration is released on every exit path.
    ///
    /// A second attach with a token that is already registered joins the
    /// existing session's wait instead of creating a duplicate; only the
    /// call that created the subscription deregisters it.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        token: AccessToken,
        sender: mpsc::Sender<ServerMessage>,
        ctx: CancellationToken,
    ) -> Result<(), AppError> {
        let room = self.require_room(room_id).await?;

        if let Some(existing) = self.registry.get(&room.id, &token).await {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(room_id = %room.id, %token, "leave room: connection closed");
                }
                _ = existing.terminated() => {
                    info!(room_id = %room.id, %token, "leave room: subscription terminated");
                }
            }
            return Ok(());
        }

        let subscription = Arc::new(Subscription::new(room.id.clone(), token.clone(), sender));
        self.registry.add(subscription.clone()).await;
        info!(room_id = %room.id, %token, "joined room");

        tokio::select! {
            _ = ctx.cancelled() => {
                info!(room_id = %room.id, %token, "leave room: connection closed");
            }
            _ = subscription.terminated() => {
                info!(room_id = %room.id, %token, "leave room: explicit leave");
            }
        }

        self.registry.remove(&room.id, &token).await;
        debug!(room_id = %room.id, %token, "subscription removed");
        Ok(())
    }

    /// Detach a subscriber from a room's live feed
    ///
    /// Fires the subscription's termination signal. Detaching a (room, token)
    /// pair with no active subscription is a successful no-op, which also
    /// makes racing detach requests safe: the loser observes the entry
    /// already gone or cancels an already-cancelled signal.
    pub async fn leave_room(&self, room_id: &RoomId, token: &AccessToken) {
        match self.registry.get(room_id, token).await {
            Some(subscription) => subscription.terminate(),
            None => debug!(%room_id, %token, "leave for absent subscription, no-op"),
        }
    }

    async fn require_room(&self, room_id: &RoomId) -> Result<Room, AppError> {
        self.rooms
            .select(room_id)
            .await?
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{InMemoryMessageStore, InMemoryRoomStore};
    use crate::types::UuidGenerator;

    fn service() -> Arc<ChatService> {
        Arc::new(ChatService::new(
            Arc::new(UuidGenerator),
            Arc::new(InMemoryRoomStore::new()),
            Arc::new(InMemoryMessageStore::new()),
        ))
    }

    async fn wait_registered(service: &ChatService, room_id: &RoomId, token: &AccessToken) {
        for _ in 0..200 {
            if service.registry.get(room_id, token).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscription for {token} was not registered in time");
    }

    fn token(s: &str) -> AccessToken {
        AccessToken::from_string(s.to_string())
    }

    async fn recv_message(rx: &mut mpsc::Receiver<ServerMessage>) -> (String, String) {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for delivery")
            .expect("feed channel closed")
        {
            ServerMessage::Message { room_id, text } => (room_id, text),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_rooms() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();
        assert_eq!(room.name, "general");

        let rooms = service.rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0], room);

        let found = service.room(&room.id).await.unwrap();
        assert_eq!(found, Some(room));
    }

    #[tokio::test]
    async fn test_issued_tokens_are_unique() {
        let service = service();
        let a = service.issue_token().await.unwrap();
        let b = service.issue_token().await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_post_to_missing_room_fails() {
        let service = service();
        let err = service
            .post_message(&RoomId::from_string("nope".to_string()), "hi".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_join_missing_room_fails() {
        let service = service();
        let (tx, _rx) = mpsc::channel(8);
        let err = service
            .join_room(
                &RoomId::from_string("nope".to_string()),
                token("tok-a"),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_broadcast_with_zero_subscribers_persists() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        let posted = service
            .post_message(&room.id, "hi".to_string())
            .await
            .unwrap();
        assert_eq!(posted.text, "hi");

        let history = service.messages(&room.id).await.unwrap();
        assert_eq!(history, vec![posted]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_then_only_remaining_after_leave() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);

        let svc = service.clone();
        let room_a = room.id.clone();
        let session_a = tokio::spawn(async move {
            svc.join_room(&room_a, token("tok-A"), tx_a, CancellationToken::new())
                .await
        });
        let svc = service.clone();
        let room_b = room.id.clone();
        let session_b = tokio::spawn(async move {
            svc.join_room(&room_b, token("tok-B"), tx_b, CancellationToken::new())
                .await
        });

        wait_registered(&service, &room.id, &token("tok-A")).await;
        wait_registered(&service, &room.id, &token("tok-B")).await;

        service.post_message(&room.id, "hi".to_string()).await.unwrap();

        assert_eq!(recv_message(&mut rx_a).await, (room.id.to_string(), "hi".to_string()));
        assert_eq!(recv_message(&mut rx_b).await, (room.id.to_string(), "hi".to_string()));

        // A leaves; its session call returns and deregisters
        service.leave_room(&room.id, &token("tok-A")).await;
        session_a.await.unwrap().unwrap();
        assert!(service.registry.get(&room.id, &token("tok-A")).await.is_none());

        service.post_message(&room.id, "bye".to_string()).await.unwrap();

        assert_eq!(recv_message(&mut rx_b).await, (room.id.to_string(), "bye".to_string()));
        // A got exactly the one message from before it left
        assert!(rx_a.try_recv().is_err());

        service.leave_room(&room.id, &token("tok-B")).await;
        session_b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_delivery_fails_broadcast_without_rollback() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, rx_b) = mpsc::channel(8);
        // B's receiving side is gone; its delivery must fail
        drop(rx_b);

        let svc = service.clone();
        let room_a = room.id.clone();
        tokio::spawn(async move {
            svc.join_room(&room_a, token("tok-A"), tx_a, CancellationToken::new())
                .await
        });
        let svc = service.clone();
        let room_b = room.id.clone();
        tokio::spawn(async move {
            svc.join_room(&room_b, token("tok-B"), tx_b, CancellationToken::new())
                .await
        });

        wait_registered(&service, &room.id, &token("tok-A")).await;
        wait_registered(&service, &room.id, &token("tok-B")).await;

        let err = service
            .post_message(&room.id, "hi".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery { .. }));

        // A still observed the message; nothing was retracted
        assert_eq!(recv_message(&mut rx_a).await, (room.id.to_string(), "hi".to_string()));

        // The message was persisted before delivery was attempted
        let history = service.messages(&room.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_context_cancellation_deregisters() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let ctx = CancellationToken::new();

        let svc = service.clone();
        let room_id = room.id.clone();
        let session_ctx = ctx.clone();
        let session = tokio::spawn(async move {
            svc.join_room(&room_id, token("x"), tx, session_ctx).await
        });

        wait_registered(&service, &room.id, &token("x")).await;

        // Connection goes away without an explicit leave
        ctx.cancel();
        session.await.unwrap().unwrap();

        assert!(service.registry.list(&room.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        // Leaving with no subscription at all is a successful no-op
        service.leave_room(&room.id, &token("ghost")).await;

        let (tx, _rx) = mpsc::channel(8);
        let svc = service.clone();
        let room_id = room.id.clone();
        let session = tokio::spawn(async move {
            svc.join_room(&room_id, token("tok-A"), tx, CancellationToken::new())
                .await
        });
        wait_registered(&service, &room.id, &token("tok-A")).await;

        service.leave_room(&room.id, &token("tok-A")).await;
        service.leave_room(&room.id, &token("tok-A")).await;
        session.await.unwrap().unwrap();

        assert!(service.registry.list(&room.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_second_attach_with_same_token_joins_the_wait() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        let (tx_1, _rx_1) = mpsc::channel(8);
        let svc = service.clone();
        let room_1 = room.id.clone();
        let first = tokio::spawn(async move {
            svc.join_room(&room_1, token("tok-A"), tx_1, CancellationToken::new())
                .await
        });
        wait_registered(&service, &room.id, &token("tok-A")).await;

        let (tx_2, _rx_2) = mpsc::channel(8);
        let svc = service.clone();
        let room_2 = room.id.clone();
        let second = tokio::spawn(async move {
            svc.join_room(&room_2, token("tok-A"), tx_2, CancellationToken::new())
                .await
        });

        // No duplicate registration
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.registry.list(&room.id).await.len(), 1);

        // One leave terminates both waits
        service.leave_room(&room.id, &token("tok-A")).await;
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert!(service.registry.list(&room.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_message_history_in_posting_order() {
        let service = service();
        let room = service.create_room("general".to_string()).await.unwrap();

        service.post_message(&room.id, "one".to_string()).await.unwrap();
        service.post_message(&room.id, "two".to_string()).await.unwrap();

        let texts: Vec<String> = service
            .messages(&room.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one".to_string(), "two".to_string()]);
    }
}
