//! Presence and typing state tracking.
//!
//! Online/offline is global per user; typing is tracked per room with an
//! inactivity deadline. A user can be typing in one room while simply
//! online with respect to every other room.

use std::collections::HashMap;
use std::time::Duration;

use chatverse_proto::id::{RoomId, Timestamp, UserId};

/// Default typing inactivity timeout.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// A user's connection state as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    /// Connected.
    Online,
    /// Disconnected; `last_seen` is recorded when known.
    Offline {
        /// When the user was last connected.
        last_seen: Option<Timestamp>,
    },
}

/// Tracks presence and per-room typing with expiry deadlines.
#[derive(Debug)]
pub struct PresenceTracker {
    users: HashMap<UserId, PresenceState>,
    /// Per room: typing users and the deadline after which each expires.
    typing: HashMap<RoomId, HashMap<UserId, Timestamp>>,
    typing_timeout_ms: u64,
}

impl PresenceTracker {
    /// Creates a tracker with the given typing inactivity timeout.
    #[must_use]
    pub fn new(typing_timeout: Duration) -> Self {
        let millis = u64::try_from(typing_timeout.as_millis()).unwrap_or(u64::MAX);
        Self {
            users: HashMap::new(),
            typing: HashMap::new(),
            typing_timeout_ms: millis,
        }
    }

    /// Returns the known state for a user. Unknown users are offline
    /// with no last-seen.
    #[must_use]
    pub fn state(&self, user: &UserId) -> PresenceState {
        self.users
            .get(user)
            .cloned()
            .unwrap_or(PresenceState::Offline { last_seen: None })
    }

    /// Marks a user online. Returns `true` if the state changed.
    pub fn set_online(&mut self, user: &UserId) -> bool {
        let prev = self
            .users
            .insert(user.clone(), PresenceState::Online);
        prev != Some(PresenceState::Online)
    }

    /// Marks a user offline, clearing their typing state everywhere.
    ///
    /// Returns whether the presence state changed, plus the rooms whose
    /// typing roster changed.
    pub fn set_offline(&mut self, user: &UserId, last_seen: Option<Timestamp>) -> (bool, Vec<RoomId>) {
        let next = PresenceState::Offline { last_seen };
        let changed = self.users.insert(user.clone(), next.clone()) != Some(next);
        let cleared = self.clear_typing_everywhere(user);
        (changed, cleared)
    }

    /// Marks a user as typing in a room, refreshing their deadline.
    ///
    /// Typing implies the user is online. Returns `true` if the room's
    /// typing roster changed (the user was not already typing there).
    pub fn start_typing(&mut self, room: &RoomId, user: &UserId, now: Timestamp) -> bool {
        self.set_online(user);
        let deadline = now.plus_millis(self.typing_timeout_ms);
        let roster = self.typing.entry(room.clone()).or_default();
        roster.insert(user.clone(), deadline).is_none()
    }

    /// Removes a user from a room's typing roster.
    ///
    /// Returns `true` if the roster changed.
    pub fn stop_typing(&mut self, room: &RoomId, user: &UserId) -> bool {
        let Some(roster) = self.typing.get_mut(room) else {
            return false;
        };
        let removed = roster.remove(user).is_some();
        if roster.is_empty() {
            self.typing.remove(room);
        }
        removed
    }

    /// Clears typing for a user in a room after they sent a message.
    ///
    /// Returns `true` if the roster changed.
    pub fn note_message_sent(&mut self, room: &RoomId, user: &UserId) -> bool {
        self.stop_typing(room, user)
    }

    /// Drops every typing entry whose deadline is at or before `now`.
    ///
    /// Returns the rooms whose roster changed, so change notifications
    /// can be emitted per room.
    pub fn expire(&mut self, now: Timestamp) -> Vec<RoomId> {
        let mut changed = Vec::new();
        self.typing.retain(|room, roster| {
            let before = roster.len();
            roster.retain(|_, deadline| *deadline > now);
            if roster.len() != before {
                changed.push(room.clone());
            }
            !roster.is_empty()
        });
        changed
    }

    /// Users currently typing in a room, sorted by id.
    #[must_use]
    pub fn typing_users(&self, room: &RoomId) -> Vec<UserId> {
        let Some(roster) = self.typing.get(room) else {
            return Vec::new();
        };
        let mut users: Vec<UserId> = roster.keys().cloned().collect();
        users.sort();
        users
    }

    fn clear_typing_everywhere(&mut self, user: &UserId) -> Vec<RoomId> {
        let mut changed = Vec::new();
        self.typing.retain(|room, roster| {
            if roster.remove(user).is_some() {
                changed.push(room.clone());
            }
            !roster.is_empty()
        });
        changed
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TIMEOUT)
    }
}
