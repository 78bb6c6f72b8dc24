//! Events emitted by the client for UI notification.

use chatverse_proto::id::{MessageId, RoomId, UserId};

use crate::error::ClientError;
use crate::presence::PresenceState;
use crate::store::Message;

/// Notifications pushed to the consumer as local state changes.
///
/// Events describe state that has already been applied; consumers
/// re-query the client for full snapshots when they need more than the
/// delta carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Room metadata changed (unread counts, last message, membership).
    RoomListChanged,
    /// A message was appended to a room, locally or remotely.
    MessageAppended {
        /// Room the message belongs to.
        room_id: RoomId,
        /// The message as currently stored (may still be pending).
        message: Message,
    },
    /// A message's id, sequence, or timestamp was rewritten on
    /// confirmation.
    MessageConfirmed {
        /// Room the message belongs to.
        room_id: RoomId,
        /// The provisional id the optimistic entry carried.
        local_id: MessageId,
        /// The backend-canonical id it now carries.
        canonical_id: MessageId,
    },
    /// A reaction set changed on a message.
    ReactionChanged {
        /// Room the message belongs to.
        room_id: RoomId,
        /// The affected message.
        message_id: MessageId,
    },
    /// A user's online state changed.
    PresenceChanged {
        /// The affected user.
        user_id: UserId,
        /// Their new state.
        state: PresenceState,
    },
    /// The set of users typing in a room changed.
    TypingChanged {
        /// The affected room.
        room_id: RoomId,
        /// Users currently typing, sorted by id.
        users: Vec<UserId>,
    },
    /// An optimistic intent was rolled back after backend rejection.
    Error {
        /// The rejection, mapped into the client taxonomy.
        error: ClientError,
        /// Short description of the intent that failed.
        context: String,
    },
}
