//! Wire frames exchanged between client and backend.
//!
//! Frames are internally tagged JSON objects whose `type` field uses
//! dotted event names (`message.append`, `reaction.toggle`, ...). Client
//! frames carry a correlation id so the backend's confirmation or
//! rejection can be matched against the optimistic local state.

use serde::{Deserialize, Serialize};

use crate::id::{CorrelationId, MessageId, RoomId, ServerSeq, Timestamp, UserId};
use crate::message::{MessageContent, WireMessage};
use crate::presence::PresenceStatus;

/// Machine-readable rejection category attached to error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Auth,
    NotFound,
    NotMember,
    Conflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::NotFound => write!(f, "notFound"),
            Self::NotMember => write!(f, "notMember"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Frames sent by a client toward the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Request to append a message to a room.
    #[serde(rename = "message.append")]
    MessageAppend {
        room_id: RoomId,
        correlation_id: CorrelationId,
        content: MessageContent,
    },
    /// Request to toggle the sender's reaction on a message.
    #[serde(rename = "reaction.toggle")]
    ReactionToggle {
        message_id: MessageId,
        emoji: String,
        correlation_id: CorrelationId,
    },
    /// Typing indicator, fire-and-forget.
    #[serde(rename = "typing.update")]
    TypingUpdate { room_id: RoomId, is_typing: bool },
}

impl ClientFrame {
    /// Returns the correlation id for frames that expect a reply.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Self::MessageAppend { correlation_id, .. }
            | Self::ReactionToggle { correlation_id, .. } => Some(correlation_id),
            Self::TypingUpdate { .. } => None,
        }
    }
}

/// Frames broadcast by the backend toward clients.
///
/// Confirmations are the same frame every member receives; the
/// originating client recognizes its own intent by the echoed
/// `correlation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// A message was appended to a room.
    #[serde(rename = "message.append")]
    MessageAppend {
        room_id: RoomId,
        payload: WireMessage,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
        server_seq: ServerSeq,
    },
    /// A reaction was toggled on a message.
    #[serde(rename = "reaction.toggle")]
    ReactionToggle {
        room_id: RoomId,
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
        server_seq: ServerSeq,
    },
    /// A user's online state changed.
    #[serde(rename = "presence.update")]
    PresenceUpdate {
        user_id: UserId,
        status: PresenceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<Timestamp>,
    },
    /// A user started or stopped typing in a room.
    #[serde(rename = "typing.update")]
    TypingUpdate {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
    /// A client intent was rejected.
    #[serde(rename = "error")]
    Error {
        kind: ErrorKind,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
}
