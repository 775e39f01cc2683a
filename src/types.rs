//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `RoomId`: opaque string identifier for a room
//! - `AccessToken`: per-attach key distinguishing subscribers of a room
//!
//! Also defines the `IdGenerator` seam used to mint both kinds of ID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Opaque room identifier (newtype pattern)
///
/// Wraps the string ID issued at room creation.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Create a RoomId from a string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access token identifying one subscriber within a room
///
/// Issued per attach; (RoomId, AccessToken) keys the subscription registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl AccessToken {
    /// Create an AccessToken from a string
    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generator of opaque string IDs
///
/// Used for both room IDs and access tokens. Injected into the service so
/// tests can substitute a deterministic implementation.
pub trait IdGenerator: Send + Sync {
    /// Produce a new unique opaque ID
    fn generate(&self) -> Result<String, AppError>;
}

/// UUID v4 backed [`IdGenerator`]
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Result<String, AppError> {
        Ok(Uuid::new_v4().to_string())
    }
}
