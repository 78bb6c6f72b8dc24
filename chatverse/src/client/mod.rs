//! Sync engine for `ChatVerse`.
//!
//! [`ChatClient`] owns all local chat state and is the only place it
//! mutates. Intents go out through [`send`](ChatClient::send_message)
//! methods (optimistic, correlation-tagged), confirmations and remote
//! events come back through [`process_one`](ChatClient::process_one),
//! and the presentation layer observes via [`ClientEvent`]s plus
//! cloning snapshot queries.

pub mod reconnect;

mod receive;
mod send;

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use chatverse_proto::frame::ClientFrame;
use chatverse_proto::id::{CorrelationId, MessageId, RoomId, ServerSeq, Timestamp, UserId};

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::directory::{Room, RoomDirectory, RoomFilter};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::presence::{PresenceState, PresenceTracker};
use crate::session::SessionHandle;
use crate::store::{Message, MessageStore, Page};

/// An optimistic mutation awaiting backend confirmation.
#[derive(Debug, Clone)]
pub(crate) enum PendingIntent {
    /// An optimistic message append; `local_id` is the provisional id.
    Append {
        room_id: RoomId,
        local_id: MessageId,
    },
    /// An optimistic reaction toggle; rollback re-toggles.
    Reaction {
        message_id: MessageId,
        emoji: String,
    },
}

/// Client-side synchronization engine.
///
/// All locks are synchronous and never held across an `.await`; backend
/// traffic happens only after local state transitions complete.
pub struct ChatClient<B: Backend> {
    backend: B,
    session: SessionHandle,
    directory: RwLock<RoomDirectory>,
    store: RwLock<MessageStore>,
    presence: RwLock<PresenceTracker>,
    /// Correlation ids of in-flight optimistic mutations.
    pending: Mutex<HashMap<CorrelationId, PendingIntent>>,
    /// Correlation ids cancelled before acknowledgment.
    cancelled: Mutex<HashSet<CorrelationId>>,
    /// Frames queued while disconnected, flushed FIFO on reconnect.
    outbox: Mutex<VecDeque<(CorrelationId, ClientFrame)>>,
    event_tx: mpsc::Sender<ClientEvent>,
    page_size: usize,
}

impl<B: Backend> ChatClient<B> {
    /// Creates a client for an established session.
    ///
    /// Returns the client and a receiver for [`ClientEvent`]s that the
    /// presentation layer should consume. The local user starts online.
    pub fn new(
        backend: B,
        session: SessionHandle,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let mut presence = PresenceTracker::new(config.typing_timeout);
        presence.set_online(&session.user.id);
        let client = Self {
            backend,
            session,
            directory: RwLock::new(RoomDirectory::new()),
            store: RwLock::new(MessageStore::new()),
            presence: RwLock::new(presence),
            pending: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashSet::new()),
            outbox: Mutex::new(VecDeque::new()),
            event_tx,
            page_size: config.page_size,
        };
        (client, event_rx)
    }

    /// The local user's id.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.session.user.id
    }

    /// The session this client runs under.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The backend link.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Registers a room in the local directory.
    pub fn add_room(&self, room: Room) {
        self.directory.write().insert(room);
        self.emit(ClientEvent::RoomListChanged);
    }

    /// Rooms matching the filter, in insertion order.
    #[must_use]
    pub fn list_rooms(&self, filter: &RoomFilter) -> Vec<Room> {
        self.directory.read().list_rooms(filter)
    }

    /// Looks a room up for display.
    ///
    /// Selection is a read: it never changes unread counters.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn select_room(&self, id: &RoomId) -> Result<Room, ClientError> {
        self.directory.read().room(id).cloned()
    }

    /// Pages through a room's log; `limit` defaults to the configured
    /// page size.
    #[must_use]
    pub fn list_messages(
        &self,
        room: &RoomId,
        cursor: Option<ServerSeq>,
        limit: Option<usize>,
    ) -> Page {
        self.store
            .read()
            .list_messages(room, cursor, limit.unwrap_or(self.page_size))
    }

    /// Snapshot of a single message.
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.store.read().message(id).cloned()
    }

    /// A user's presence as currently known.
    #[must_use]
    pub fn presence_state(&self, user: &UserId) -> PresenceState {
        self.presence.read().state(user)
    }

    /// Users currently typing in a room, sorted by id.
    #[must_use]
    pub fn typing_users(&self, room: &RoomId) -> Vec<UserId> {
        self.presence.read().typing_users(room)
    }

    /// Expires stale typing indicators and emits a change event for
    /// every room whose roster shrank. Callers drive this from a timer.
    pub fn expire_typing(&self) {
        let changed = self.presence.write().expire(Timestamp::now());
        for room_id in changed {
            let users = self.presence.read().typing_users(&room_id);
            self.emit(ClientEvent::TypingChanged { room_id, users });
        }
    }

    /// Settles a correlation id on frame arrival: drops any cancel
    /// marker (the backend has answered, nothing is left to skip) and
    /// takes the pending intent if one is still open.
    pub(crate) fn take_pending(&self, correlation_id: &CorrelationId) -> Option<PendingIntent> {
        self.cancelled.lock().remove(correlation_id);
        self.pending.lock().remove(correlation_id)
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::warn!("event channel full, notification dropped");
        }
    }
}
