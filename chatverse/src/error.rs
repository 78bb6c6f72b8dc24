//! Client-facing error taxonomy.

use chatverse_proto::frame::ErrorKind;
use chatverse_proto::id::{RoomId, UserId};
use chatverse_proto::message::ValidationError;

/// Errors surfaced to callers of the client API.
///
/// Clone and equality are derived so rejected intents can be replayed
/// into events and asserted on directly in tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The session is missing or the credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A referenced room, message, or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The user attempted an operation in a room they do not belong to.
    #[error("user {user} is not a member of room {room}")]
    NotMember { user: UserId, room: RoomId },

    /// The backend link is down and the intent could not be delivered.
    #[error("connection error: {0}")]
    Connection(String),

    /// An optimistic intent was rejected or raced with a conflicting one.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Message content failed validation before leaving the client.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl ClientError {
    /// Builds a client error from a backend rejection frame.
    ///
    /// `user` is the local session user and `room` the room echoed back
    /// in the rejection, when present.
    #[must_use]
    pub fn from_rejection(
        kind: ErrorKind,
        reason: &str,
        user: &UserId,
        room: Option<&RoomId>,
    ) -> Self {
        match kind {
            ErrorKind::Auth => Self::Auth(reason.to_string()),
            ErrorKind::NotFound => Self::NotFound(reason.to_string()),
            ErrorKind::Conflict => Self::Conflict(reason.to_string()),
            ErrorKind::NotMember => match room {
                Some(room) => Self::NotMember {
                    user: user.clone(),
                    room: room.clone(),
                },
                None => Self::Conflict(reason.to_string()),
            },
        }
    }
}
