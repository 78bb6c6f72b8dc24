//! Message payloads and content validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{MessageId, RoomId, Timestamp, UserId};

/// Maximum content size in bytes.
pub const MAX_CONTENT_SIZE: usize = 64 * 1024;

/// Body of a chat message.
///
/// Text carries the message body inline. File and image variants carry a
/// URL plus a display name; the bytes themselves never travel over this
/// protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MessageContent {
    Text(String),
    File { url: String, name: String },
    Image { url: String, name: String },
}

impl MessageContent {
    /// Returns the size in bytes of the payload that counts against
    /// [`MAX_CONTENT_SIZE`].
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Text(body) => body.len(),
            Self::File { url, name } | Self::Image { url, name } => url.len() + name.len(),
        }
    }

    /// Validates the content against protocol limits.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for blank text or a missing URL,
    /// and [`ValidationError::TooLarge`] when the payload exceeds
    /// [`MAX_CONTENT_SIZE`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Text(body) => {
                if body.trim().is_empty() {
                    return Err(ValidationError::Empty);
                }
            }
            Self::File { url, .. } | Self::Image { url, .. } => {
                if url.trim().is_empty() {
                    return Err(ValidationError::Empty);
                }
            }
        }
        let size = self.size();
        if size > MAX_CONTENT_SIZE {
            return Err(ValidationError::TooLarge {
                size,
                max: MAX_CONTENT_SIZE,
            });
        }
        Ok(())
    }
}

/// Message content validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message content is empty")]
    Empty,
    #[error("message content is {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

/// A message as it appears on the wire.
///
/// `id` and `timestamp` here are backend-canonical values. Client-local
/// bookkeeping (sequence numbers, read flags, reactions) lives outside
/// this payload and is carried by the surrounding frame or derived from
/// the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub timestamp: Timestamp,
    pub content: MessageContent,
}
