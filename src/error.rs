//! Error types for the chat server
//!
//! Defines application-level errors shared by the stores, the broadcast
//! service, and the transport layer. Uses thiserror for ergonomic error
//! definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Room lookup miss on attach or broadcast
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Store insert/select failure, fatal to the calling operation
    #[error("Store failure: {0}")]
    Persistence(String),

    /// A subscriber's push failed during broadcast
    ///
    /// Surfaced as the broadcast's overall failure; deliveries that already
    /// succeeded are not retracted.
    #[error("Delivery to subscriber {token} failed: {reason}")]
    Delivery { token: String, reason: String },

    /// ID generation failure, fatal to room creation / token issuance
    #[error("ID generation failed: {0}")]
    IdGeneration(String),
}
