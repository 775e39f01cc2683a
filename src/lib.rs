//! Multi-room WebSocket Chat Server Library
//!
//! A chat server where clients create named rooms, attach to a room's live
//! feed with an access token, and post messages that are broadcast to every
//! current subscriber of the room.
//!
//! # Features
//! - WebSocket connection handling
//! - Room creation and listing
//! - Access token issuance
//! - Live room feeds (join/leave with clean deregistration on disconnect)
//! - Concurrent message broadcast to all subscribers of a room
//! - In-memory room and message stores behind trait seams
//!
//! # Architecture
//! A shared `ChatService` owns the `SubscriptionRegistry`, the only shared
//! mutable state:
//! - Each connection has a `handler` task that parses requests and calls the
//!   service directly
//! - A joined room session blocks in `join_room` until the connection context
//!   is cancelled or an explicit leave fires its termination signal
//! - `post_message` persists the message, snapshots the room's subscribers,
//!   and pushes to all of them concurrently
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use roomcast::{handle_connection, ChatService, InMemoryMessageStore, InMemoryRoomStore, UuidGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let service = Arc::new(ChatService::new(
//!         Arc::new(UuidGenerator),
//!         Arc::new(InMemoryRoomStore::new()),
//!         Arc::new(InMemoryMessageStore::new()),
//!     ));
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let service = service.clone();
//!         tokio::spawn(handle_connection(stream, service));
//!     }
//! }
//! ```

pub mod error;
pub mod handler;
pub mod message;
pub mod room;
pub mod service;
pub mod store;
pub mod subscription;
pub mod types;

// Re-export main types for convenience
pub use error::AppError;
pub use handler::handle_connection;
pub use message::{ClientMessage, ErrorCode, ServerMessage};
pub use room::{ChatMessage, Room};
pub use service::ChatService;
pub use store::{InMemoryMessageStore, InMemoryRoomStore, MessageStore, RoomStore};
pub use subscription::{Subscription, SubscriptionRegistry};
pub use types::{AccessToken, IdGenerator, RoomId, UuidGenerator};
