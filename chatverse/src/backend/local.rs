//! In-process reference backend.
//!
//! [`LocalServer`] is the authority: it owns the room table, assigns
//! per-room sequence numbers, mints canonical message ids and
//! timestamps, validates membership, and fans confirmed frames out to
//! every connected member. [`LocalBackend`] is one session's link to it
//! and supports simulated disconnect/reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatverse_proto::frame::{ClientFrame, ErrorKind, ServerFrame};
use chatverse_proto::id::{CorrelationId, MessageId, RoomId, ServerSeq, Timestamp, UserId};
use chatverse_proto::message::WireMessage;

use crate::directory::{Room, RoomKind};

use super::{Backend, BackendError};

/// Authoritative room record held by the server.
#[derive(Debug)]
struct ServerRoom {
    id: RoomId,
    kind: RoomKind,
    members: Vec<UserId>,
    next_seq: ServerSeq,
    messages: Vec<(ServerSeq, WireMessage)>,
}

impl ServerRoom {
    fn is_member(&self, user: &UserId) -> bool {
        (self.kind == RoomKind::Public && self.members.is_empty()) || self.members.contains(user)
    }
}

#[derive(Default)]
struct ServerState {
    rooms: Mutex<Vec<ServerRoom>>,
    /// Message id to owning room, for reaction routing.
    message_index: Mutex<HashMap<MessageId, RoomId>>,
    /// Connected sessions and their outbound frame channels.
    sessions: Mutex<HashMap<UserId, mpsc::Sender<ServerFrame>>>,
    /// Last-seen times for users that have disconnected.
    last_seen: Mutex<HashMap<UserId, Timestamp>>,
}

/// In-process chat backend shared by every [`LocalBackend`] session.
#[derive(Clone, Default)]
pub struct LocalServer {
    state: Arc<ServerState>,
}

impl LocalServer {
    /// Creates an empty server with no rooms or sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a room. Membership checks use the room's member list;
    /// a public room with an empty member list admits everyone.
    pub fn create_room(&self, room: &Room) {
        let mut rooms = self.state.rooms.lock();
        if rooms.iter().any(|r| r.id == room.id) {
            tracing::warn!(room_id = %room.id, "room already exists, ignoring");
            return;
        }
        rooms.push(ServerRoom {
            id: room.id.clone(),
            kind: room.kind,
            members: room.members.clone(),
            next_seq: ServerSeq::new(1),
            messages: Vec::new(),
        });
    }

    /// Removes a user from a room's member list. Lets tests and demos
    /// make a client's cached membership stale.
    pub fn remove_member(&self, room_id: &RoomId, user: &UserId) {
        let mut rooms = self.state.rooms.lock();
        if let Some(room) = rooms.iter_mut().find(|r| r.id == *room_id) {
            room.members.retain(|m| m != user);
        }
    }

    /// Connects a user, returning their session link.
    ///
    /// Existing sessions learn the newcomer is online; the newcomer
    /// receives the current presence of everyone already known.
    #[must_use]
    pub fn connect(&self, user: UserId, buffer: usize) -> LocalBackend {
        let rx = self.register(&user, buffer);
        LocalBackend {
            server: self.clone(),
            user,
            rx: tokio::sync::Mutex::new(rx),
            connected: AtomicBool::new(true),
            buffer,
        }
    }

    fn register(&self, user: &UserId, buffer: usize) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(buffer);

        let snapshot: Vec<ServerFrame> = {
            let sessions = self.state.sessions.lock();
            let last_seen = self.state.last_seen.lock();
            sessions
                .keys()
                .filter(|other| *other != user)
                .map(|other| ServerFrame::PresenceUpdate {
                    user_id: other.clone(),
                    status: chatverse_proto::presence::PresenceStatus::Online,
                    last_seen: None,
                })
                .chain(last_seen.iter().filter(|(u, _)| !sessions.contains_key(*u)).map(
                    |(u, ts)| ServerFrame::PresenceUpdate {
                        user_id: u.clone(),
                        status: chatverse_proto::presence::PresenceStatus::Offline,
                        last_seen: Some(*ts),
                    },
                ))
                .collect()
        };
        for frame in snapshot {
            let _ = tx.try_send(frame);
        }

        self.state.sessions.lock().insert(user.clone(), tx);
        self.state.last_seen.lock().remove(user);

        self.broadcast_except(
            user,
            &ServerFrame::PresenceUpdate {
                user_id: user.clone(),
                status: chatverse_proto::presence::PresenceStatus::Online,
                last_seen: None,
            },
        );
        tracing::debug!(user_id = %user, "session connected");
        rx
    }

    /// Drops a user's session and broadcasts their offline transition.
    pub fn disconnect(&self, user: &UserId) {
        if self.state.sessions.lock().remove(user).is_none() {
            return;
        }
        let now = Timestamp::now();
        self.state.last_seen.lock().insert(user.clone(), now);
        self.broadcast_except(
            user,
            &ServerFrame::PresenceUpdate {
                user_id: user.clone(),
                status: chatverse_proto::presence::PresenceStatus::Offline,
                last_seen: Some(now),
            },
        );
        tracing::debug!(user_id = %user, "session disconnected");
    }

    /// Validates and applies one client frame, fanning results out.
    fn handle(&self, user: &UserId, frame: ClientFrame) {
        match frame {
            ClientFrame::MessageAppend {
                room_id,
                correlation_id,
                content,
            } => {
                if let Err(err) = content.validate() {
                    self.reject(
                        user,
                        ErrorKind::Conflict,
                        &err.to_string(),
                        Some(correlation_id),
                        Some(room_id),
                    );
                    return;
                }
                let accepted = {
                    let mut rooms = self.state.rooms.lock();
                    let Some(room) = rooms.iter_mut().find(|r| r.id == room_id) else {
                        drop(rooms);
                        self.reject(
                            user,
                            ErrorKind::NotFound,
                            &format!("room {room_id} does not exist"),
                            Some(correlation_id),
                            Some(room_id),
                        );
                        return;
                    };
                    if !room.is_member(user) {
                        let id = room.id.clone();
                        drop(rooms);
                        self.reject(
                            user,
                            ErrorKind::NotMember,
                            &format!("user {user} is not a member of room {id}"),
                            Some(correlation_id),
                            Some(id),
                        );
                        return;
                    }

                    let seq = room.next_seq;
                    room.next_seq = seq.next();
                    let payload = WireMessage {
                        id: MessageId::new(),
                        room_id: room.id.clone(),
                        sender_id: user.clone(),
                        timestamp: Timestamp::now(),
                        content,
                    };
                    room.messages.push((seq, payload.clone()));
                    (room.members.clone(), payload, seq)
                };
                let (members, payload, seq) = accepted;
                self.state
                    .message_index
                    .lock()
                    .insert(payload.id.clone(), payload.room_id.clone());
                tracing::debug!(room_id = %payload.room_id, %seq, "message accepted");
                self.fanout(
                    &members,
                    &ServerFrame::MessageAppend {
                        room_id: payload.room_id.clone(),
                        payload,
                        correlation_id: Some(correlation_id),
                        server_seq: seq,
                    },
                );
            }
            ClientFrame::ReactionToggle {
                message_id,
                emoji,
                correlation_id,
            } => {
                let Some(room_id) = self.state.message_index.lock().get(&message_id).cloned()
                else {
                    self.reject(
                        user,
                        ErrorKind::NotFound,
                        &format!("message {message_id} does not exist"),
                        Some(correlation_id),
                        None,
                    );
                    return;
                };
                let accepted = {
                    let mut rooms = self.state.rooms.lock();
                    let Some(room) = rooms.iter_mut().find(|r| r.id == room_id) else {
                        return;
                    };
                    if !room.is_member(user) {
                        let id = room.id.clone();
                        drop(rooms);
                        self.reject(
                            user,
                            ErrorKind::NotMember,
                            &format!("user {user} is not a member of room {id}"),
                            Some(correlation_id),
                            Some(id),
                        );
                        return;
                    }
                    let seq = room.next_seq;
                    room.next_seq = seq.next();
                    (room.members.clone(), seq)
                };
                let (members, seq) = accepted;
                self.fanout(
                    &members,
                    &ServerFrame::ReactionToggle {
                        room_id,
                        message_id,
                        user_id: user.clone(),
                        emoji,
                        correlation_id: Some(correlation_id),
                        server_seq: seq,
                    },
                );
            }
            ClientFrame::TypingUpdate { room_id, is_typing } => {
                // Fire-and-forget: invalid typing frames are dropped.
                let members = {
                    let rooms = self.state.rooms.lock();
                    let Some(room) = rooms.iter().find(|r| r.id == room_id) else {
                        tracing::debug!(room_id = %room_id, "typing for unknown room dropped");
                        return;
                    };
                    if !room.is_member(user) {
                        tracing::debug!(room_id = %room_id, user_id = %user, "typing from non-member dropped");
                        return;
                    }
                    room.members.clone()
                };
                let frame = ServerFrame::TypingUpdate {
                    room_id,
                    user_id: user.clone(),
                    is_typing,
                };
                let sessions = self.state.sessions.lock();
                for (member, tx) in sessions.iter() {
                    if member == user {
                        continue;
                    }
                    if !members.is_empty() && !members.contains(member) {
                        continue;
                    }
                    let _ = tx.try_send(frame.clone());
                }
            }
        }
    }

    /// Sends a typed error frame to the offending session only.
    fn reject(
        &self,
        user: &UserId,
        kind: ErrorKind,
        reason: &str,
        correlation_id: Option<CorrelationId>,
        room_id: Option<RoomId>,
    ) {
        tracing::debug!(user_id = %user, %kind, reason, "frame rejected");
        let sessions = self.state.sessions.lock();
        if let Some(tx) = sessions.get(user) {
            let _ = tx.try_send(ServerFrame::Error {
                kind,
                reason: reason.to_string(),
                correlation_id,
                room_id,
            });
        }
    }

    /// Delivers a frame to every connected member of a room. An empty
    /// member list means a fully open room: every session receives it.
    fn fanout(&self, members: &[UserId], frame: &ServerFrame) {
        let sessions = self.state.sessions.lock();
        for (user, tx) in sessions.iter() {
            if !members.is_empty() && !members.contains(user) {
                continue;
            }
            if tx.try_send(frame.clone()).is_err() {
                tracing::warn!(user_id = %user, "session channel full, frame dropped");
            }
        }
    }

    fn broadcast_except(&self, skip: &UserId, frame: &ServerFrame) {
        let sessions = self.state.sessions.lock();
        for (user, tx) in sessions.iter() {
            if user == skip {
                continue;
            }
            let _ = tx.try_send(frame.clone());
        }
    }
}

/// One session's link to a [`LocalServer`].
pub struct LocalBackend {
    server: LocalServer,
    user: UserId,
    rx: tokio::sync::Mutex<mpsc::Receiver<ServerFrame>>,
    connected: AtomicBool,
    buffer: usize,
}

impl LocalBackend {
    /// The user this session belongs to.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Simulates losing the link: the server drops the session and
    /// broadcasts the offline transition. `recv` and `send` fail until
    /// [`Backend::reconnect`] succeeds.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.server.disconnect(&self.user);
    }
}

impl Backend for LocalBackend {
    async fn send(&self, frame: ClientFrame) -> Result<(), BackendError> {
        if !self.is_connected() {
            return Err(BackendError::Disconnected);
        }
        self.server.handle(&self.user, frame);
        Ok(())
    }

    async fn recv(&self) -> Result<ServerFrame, BackendError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BackendError::Disconnected);
        }
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(BackendError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), BackendError> {
        let fresh = self.server.register(&self.user, self.buffer);
        *self.rx.lock().await = fresh;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
