//! Room directory: metadata, membership, and unread tracking.

use chatverse_proto::id::{MessageId, RoomId, UserId};

use crate::error::ClientError;

/// Visibility class of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    /// Open channel; anyone may be listed as a member.
    Public,
    /// Invitation-only conversation.
    Private,
}

/// Metadata for a single room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Stable opaque identifier.
    pub id: RoomId,
    /// Display name.
    pub name: String,
    /// Visibility class.
    pub kind: RoomKind,
    /// Members in insertion order, without duplicates.
    pub members: Vec<UserId>,
    /// Messages accepted since the local user last marked the room read.
    pub unread: u32,
    /// Most recently accepted message, if any.
    pub last_message: Option<MessageId>,
}

impl Room {
    /// Creates a room with the given members; duplicates are dropped
    /// while preserving first-occurrence order.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RoomKind,
        members: Vec<UserId>,
    ) -> Self {
        let mut deduped: Vec<UserId> = Vec::with_capacity(members.len());
        for member in members {
            if !deduped.contains(&member) {
                deduped.push(member);
            }
        }
        Self {
            id: RoomId::new(id),
            name: name.into(),
            kind,
            members: deduped,
            unread: 0,
            last_message: None,
        }
    }

    /// Whether the user belongs to this room.
    #[must_use]
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

/// Filter applied by [`RoomDirectory::list_rooms`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomFilter {
    /// Restrict to rooms of this kind.
    pub kind: Option<RoomKind>,
    /// Restrict to rooms this user belongs to.
    pub member: Option<UserId>,
}

impl RoomFilter {
    fn matches(&self, room: &Room) -> bool {
        if let Some(kind) = self.kind
            && room.kind != kind
        {
            return false;
        }
        if let Some(ref member) = self.member
            && !room.is_member(member)
        {
            return false;
        }
        true
    }
}

/// In-memory room table preserving insertion order.
///
/// Selection is a read: looking a room up never mutates its unread
/// counter. Only [`mark_read`](Self::mark_read) resets it, and only for
/// the named room.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl RoomDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { rooms: Vec::new() }
    }

    /// Adds a room, replacing any existing room with the same id.
    pub fn insert(&mut self, room: Room) {
        if let Some(existing) = self.rooms.iter_mut().find(|r| r.id == room.id) {
            *existing = room;
        } else {
            self.rooms.push(room);
        }
    }

    /// Lists rooms matching the filter, in insertion order.
    #[must_use]
    pub fn list_rooms(&self, filter: &RoomFilter) -> Vec<Room> {
        self.rooms
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Looks up a room by id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn room(&self, id: &RoomId) -> Result<&Room, ClientError> {
        self.rooms
            .iter()
            .find(|r| r.id == *id)
            .ok_or_else(|| ClientError::NotFound(format!("room {id} does not exist")))
    }

    /// Whether the user belongs to the room. Unknown rooms yield `false`.
    #[must_use]
    pub fn is_member(&self, room_id: &RoomId, user: &UserId) -> bool {
        self.rooms
            .iter()
            .find(|r| r.id == *room_id)
            .is_some_and(|r| r.is_member(user))
    }

    /// Resets the room's unread counter to zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn mark_read(&mut self, id: &RoomId) -> Result<(), ClientError> {
        let room = self.room_mut(id)?;
        room.unread = 0;
        Ok(())
    }

    /// Increments the room's unread counter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn increment_unread(&mut self, id: &RoomId) -> Result<(), ClientError> {
        let room = self.room_mut(id)?;
        room.unread = room.unread.saturating_add(1);
        Ok(())
    }

    /// Updates the room's last-message pointer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn set_last_message(
        &mut self,
        id: &RoomId,
        message: Option<MessageId>,
    ) -> Result<(), ClientError> {
        let room = self.room_mut(id)?;
        room.last_message = message;
        Ok(())
    }

    fn room_mut(&mut self, id: &RoomId) -> Result<&mut Room, ClientError> {
        self.rooms
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or_else(|| ClientError::NotFound(format!("room {id} does not exist")))
    }
}
