//! Ordered per-room message log with optimistic entries and reactions.
//!
//! Within a room, confirmed messages are kept sorted by their
//! backend-assigned sequence number; optimistic (pending) entries sit
//! after them in insertion order until the backend confirms or rejects
//! them. Sequence numbers, not timestamps, are the ordering authority.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chatverse_proto::id::{MessageId, RoomId, ServerSeq, Timestamp, UserId};
use chatverse_proto::message::MessageContent;

use crate::error::ClientError;

/// A message as held in the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Canonical id once confirmed; provisional until then.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Body.
    pub content: MessageContent,
    /// Backend-canonical once confirmed; provisional until then.
    pub timestamp: Timestamp,
    /// Backend-assigned order; `None` while the entry is optimistic.
    pub server_seq: Option<ServerSeq>,
    /// Whether the local user has read this message.
    pub read: bool,
    /// Emoji reactions. An emoji key never maps to an empty set.
    pub reactions: BTreeMap<String, BTreeSet<UserId>>,
}

impl Message {
    /// Builds an unconfirmed message with a fresh provisional id.
    #[must_use]
    pub fn pending(room_id: RoomId, sender_id: UserId, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            sender_id,
            content,
            timestamp: Timestamp::now(),
            server_seq: None,
            read: true,
            reactions: BTreeMap::new(),
        }
    }

    /// Whether the entry is still awaiting backend confirmation.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.server_seq.is_none()
    }
}

/// One page of a room's log, ascending by sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Messages in order.
    pub messages: Vec<Message>,
    /// Cursor for the next page; `None` on the final page.
    pub next_cursor: Option<ServerSeq>,
}

/// Per-room message log plus a global id index.
#[derive(Debug, Default)]
pub struct MessageStore {
    /// Confirmed entries sorted by seq, then pending in insertion order.
    rooms: HashMap<RoomId, Vec<Message>>,
    /// Message id to owning room.
    index: HashMap<MessageId, RoomId>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an optimistic entry to the end of its room's log.
    pub fn insert_pending(&mut self, message: Message) {
        self.index
            .insert(message.id.clone(), message.room_id.clone());
        self.rooms
            .entry(message.room_id.clone())
            .or_default()
            .push(message);
    }

    /// Rewrites a pending entry with the backend's canonical identity
    /// and moves it into the confirmed region.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no entry with `local_id`
    /// exists, or [`ClientError::Conflict`] if the entry was already
    /// confirmed.
    pub fn confirm(
        &mut self,
        local_id: &MessageId,
        canonical_id: MessageId,
        seq: ServerSeq,
        timestamp: Timestamp,
    ) -> Result<(), ClientError> {
        let room_id = self
            .index
            .get(local_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("message {local_id} not in store")))?;
        let log = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| ClientError::NotFound(format!("room {room_id} has no log")))?;
        let pos = log
            .iter()
            .position(|m| m.id == *local_id)
            .ok_or_else(|| ClientError::NotFound(format!("message {local_id} not in log")))?;

        if !log[pos].is_pending() {
            return Err(ClientError::Conflict(format!(
                "message {local_id} is already confirmed"
            )));
        }

        let mut message = log.remove(pos);
        self.index.remove(local_id);
        message.id = canonical_id.clone();
        message.server_seq = Some(seq);
        message.timestamp = timestamp;

        let insert_at = log.partition_point(|m| m.server_seq.is_some_and(|s| s <= seq));
        log.insert(insert_at, message);
        self.index.insert(canonical_id, room_id);
        Ok(())
    }

    /// Removes a message outright (optimistic rollback).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such message exists.
    pub fn remove(&mut self, message_id: &MessageId) -> Result<Message, ClientError> {
        let room_id = self
            .index
            .remove(message_id)
            .ok_or_else(|| ClientError::NotFound(format!("message {message_id} not in store")))?;
        let log = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| ClientError::NotFound(format!("room {room_id} has no log")))?;
        let pos = log
            .iter()
            .position(|m| m.id == *message_id)
            .ok_or_else(|| ClientError::NotFound(format!("message {message_id} not in log")))?;
        Ok(log.remove(pos))
    }

    /// Inserts a confirmed message from the backend stream.
    ///
    /// Returns `false` (and changes nothing) if the room already holds a
    /// message with the same sequence number.
    pub fn apply_remote(&mut self, message: Message) -> bool {
        let Some(seq) = message.server_seq else {
            tracing::warn!(message_id = %message.id, "remote message without seq dropped");
            return false;
        };
        let log = self.rooms.entry(message.room_id.clone()).or_default();
        if log.iter().any(|m| m.server_seq == Some(seq)) {
            tracing::debug!(room_id = %message.room_id, %seq, "duplicate seq ignored");
            return false;
        }
        let insert_at = log.partition_point(|m| m.server_seq.is_some_and(|s| s <= seq));
        self.index
            .insert(message.id.clone(), message.room_id.clone());
        log.insert(insert_at, message);
        true
    }

    /// Looks up a message by id.
    #[must_use]
    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        let room_id = self.index.get(message_id)?;
        self.rooms
            .get(room_id)?
            .iter()
            .find(|m| m.id == *message_id)
    }

    /// Toggles `user`'s reaction with `emoji` on a message.
    ///
    /// Returns `true` if the reaction is present after the call. When
    /// the last reactor for an emoji is removed, the emoji entry itself
    /// is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such message exists.
    pub fn toggle_reaction(
        &mut self,
        message_id: &MessageId,
        user: &UserId,
        emoji: &str,
    ) -> Result<bool, ClientError> {
        let room_id = self
            .index
            .get(message_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("message {message_id} not in store")))?;
        let message = self
            .rooms
            .get_mut(&room_id)
            .and_then(|log| log.iter_mut().find(|m| m.id == *message_id))
            .ok_or_else(|| ClientError::NotFound(format!("message {message_id} not in log")))?;

        let reactors = message.reactions.entry(emoji.to_string()).or_default();
        if reactors.remove(user) {
            if reactors.is_empty() {
                message.reactions.remove(emoji);
            }
            Ok(false)
        } else {
            reactors.insert(user.clone());
            Ok(true)
        }
    }

    /// Marks every message in the room as read.
    pub fn mark_read(&mut self, room_id: &RoomId) {
        if let Some(log) = self.rooms.get_mut(room_id) {
            for message in log.iter_mut() {
                message.read = true;
            }
        }
    }

    /// Returns the id of the room's most recent message: the highest
    /// confirmed seq, or the newest pending entry if nothing is
    /// confirmed.
    #[must_use]
    pub fn last_message(&self, room_id: &RoomId) -> Option<MessageId> {
        let log = self.rooms.get(room_id)?;
        log.last().map(|m| m.id.clone())
    }

    /// Pages through a room's log, ascending.
    ///
    /// `cursor` is the sequence of the last confirmed message from the
    /// previous page; pass `None` to start from the beginning. Pending
    /// entries appear only on the final page, after all remaining
    /// confirmed messages. A page returns a cursor whenever anything —
    /// more confirmed messages or a pending tail — is left to fetch, so
    /// cursor-following callers always reach the pending entries.
    #[must_use]
    pub fn list_messages(
        &self,
        room_id: &RoomId,
        cursor: Option<ServerSeq>,
        limit: usize,
    ) -> Page {
        let Some(log) = self.rooms.get(room_id) else {
            return Page {
                messages: Vec::new(),
                next_cursor: None,
            };
        };

        let confirmed: Vec<&Message> = log
            .iter()
            .filter(|m| match (m.server_seq, cursor) {
                (Some(seq), Some(after)) => seq > after,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .collect();
        let has_pending = log.iter().any(Message::is_pending);

        if confirmed.len() > limit || (confirmed.len() == limit && has_pending) {
            let page: Vec<Message> = confirmed[..limit.min(confirmed.len())]
                .iter()
                .map(|m| (*m).clone())
                .collect();
            let next_cursor = page.last().and_then(|m| m.server_seq);
            return Page {
                messages: page,
                next_cursor,
            };
        }

        // Final page: all remaining confirmed, then the pending tail.
        let mut messages: Vec<Message> = confirmed.into_iter().cloned().collect();
        messages.extend(log.iter().filter(|m| m.is_pending()).cloned());
        Page {
            messages,
            next_cursor: None,
        }
    }
}
