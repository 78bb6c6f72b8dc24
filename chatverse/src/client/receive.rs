//! Inbound frame processing: reconciliation of confirmations, remote
//! events, and rejections.
//!
//! Frames are applied strictly in arrival order; within a room that
//! order carries the backend's sequence numbers, so every observer of
//! the same stream converges on the same log.

use std::collections::BTreeMap;

use chatverse_proto::frame::ServerFrame;
use chatverse_proto::id::Timestamp;
use chatverse_proto::message::WireMessage;
use chatverse_proto::presence::PresenceStatus;

use crate::backend::{Backend, BackendError};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::presence::PresenceState;
use crate::store::Message;

use super::{ChatClient, PendingIntent};

impl<B: Backend> ChatClient<B> {
    /// Receives and applies the next server frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] when the backend link is
    /// down; callers then move to
    /// [`reconnect_with_backoff`](Self::reconnect_with_backoff).
    pub async fn process_one(&self) -> Result<(), ClientError> {
        let frame = self.backend.recv().await.map_err(|e| match e {
            BackendError::Disconnected => ClientError::Connection("backend link down".into()),
            BackendError::Rejected(reason) => ClientError::Connection(reason),
        })?;
        self.apply_frame(frame);
        Ok(())
    }

    /// Applies one server frame to local state.
    fn apply_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::MessageAppend {
                room_id,
                payload,
                correlation_id,
                server_seq,
            } => {
                let own_intent = correlation_id
                    .as_ref()
                    .and_then(|cid| self.take_pending(cid));

                if let Some(PendingIntent::Append { local_id, .. }) = own_intent {
                    // Confirmation of our optimistic entry: the canonical
                    // id, seq, and timestamp win.
                    let confirmed = self.store.write().confirm(
                        &local_id,
                        payload.id.clone(),
                        server_seq,
                        payload.timestamp,
                    );
                    match confirmed {
                        Ok(()) => {
                            let tail = self.store.read().last_message(&room_id);
                            let _ = self.directory.write().set_last_message(&room_id, tail);
                            self.emit(ClientEvent::MessageConfirmed {
                                room_id: room_id.clone(),
                                local_id,
                                canonical_id: payload.id.clone(),
                            });
                            self.emit(ClientEvent::RoomListChanged);
                        }
                        Err(e) => {
                            // Cancel raced with the ack: the entry is gone
                            // locally but accepted authoritatively.
                            tracing::debug!(error = %e, "confirm fell back to remote apply");
                            self.apply_remote_append(&payload, server_seq);
                        }
                    }
                } else {
                    self.apply_remote_append(&payload, server_seq);
                }
            }
            ServerFrame::ReactionToggle {
                room_id,
                message_id,
                user_id,
                emoji,
                correlation_id,
                ..
            } => {
                let own_intent = correlation_id
                    .as_ref()
                    .and_then(|cid| self.take_pending(cid));
                if own_intent.is_some() {
                    // Already applied optimistically; the ack settles it.
                    return;
                }
                match self
                    .store
                    .write()
                    .toggle_reaction(&message_id, &user_id, &emoji)
                {
                    Ok(_) => self.emit(ClientEvent::ReactionChanged {
                        room_id,
                        message_id,
                    }),
                    Err(e) => {
                        tracing::warn!(message_id = %message_id, error = %e, "reaction for unknown message dropped");
                    }
                }
            }
            ServerFrame::PresenceUpdate {
                user_id,
                status,
                last_seen,
            } => {
                let (changed, cleared_rooms, state) = {
                    let mut presence = self.presence.write();
                    match status {
                        PresenceStatus::Online => {
                            (presence.set_online(&user_id), Vec::new(), PresenceState::Online)
                        }
                        PresenceStatus::Offline => {
                            let (changed, cleared) = presence.set_offline(&user_id, last_seen);
                            (changed, cleared, PresenceState::Offline { last_seen })
                        }
                    }
                };
                if changed {
                    self.emit(ClientEvent::PresenceChanged {
                        user_id: user_id.clone(),
                        state,
                    });
                }
                for room_id in cleared_rooms {
                    let users = self.presence.read().typing_users(&room_id);
                    self.emit(ClientEvent::TypingChanged { room_id, users });
                }
            }
            ServerFrame::TypingUpdate {
                room_id,
                user_id,
                is_typing,
            } => {
                let changed = {
                    let mut presence = self.presence.write();
                    if is_typing {
                        presence.start_typing(&room_id, &user_id, Timestamp::now())
                    } else {
                        presence.stop_typing(&room_id, &user_id)
                    }
                };
                if changed {
                    let users = self.presence.read().typing_users(&room_id);
                    self.emit(ClientEvent::TypingChanged { room_id, users });
                }
            }
            ServerFrame::Error {
                kind,
                reason,
                correlation_id,
                room_id,
            } => {
                let intent = correlation_id
                    .as_ref()
                    .and_then(|cid| self.take_pending(cid));
                let context = match &intent {
                    Some(PendingIntent::Append { room_id, .. }) => {
                        format!("message append to {room_id}")
                    }
                    Some(PendingIntent::Reaction { message_id, emoji }) => {
                        format!("reaction {emoji} on {message_id}")
                    }
                    None => "backend rejection".to_string(),
                };
                if let Some(intent) = intent {
                    self.rollback(&intent);
                }
                let error =
                    ClientError::from_rejection(kind, &reason, self.user_id(), room_id.as_ref());
                tracing::warn!(%kind, reason, "intent rejected by backend");
                self.emit(ClientEvent::Error { error, context });
            }
        }
    }

    /// Applies a confirmed append that did not originate here (or whose
    /// optimistic entry was cancelled).
    fn apply_remote_append(&self, payload: &WireMessage, server_seq: chatverse_proto::id::ServerSeq) {
        let from_self = payload.sender_id == *self.user_id();
        let message = Message {
            id: payload.id.clone(),
            room_id: payload.room_id.clone(),
            sender_id: payload.sender_id.clone(),
            content: payload.content.clone(),
            timestamp: payload.timestamp,
            server_seq: Some(server_seq),
            read: from_self,
            reactions: BTreeMap::new(),
        };
        let room_id = message.room_id.clone();

        if !self.store.write().apply_remote(message.clone()) {
            return;
        }

        let tail = self.store.read().last_message(&room_id);
        {
            let mut directory = self.directory.write();
            let _ = directory.set_last_message(&room_id, tail);
            if !from_self {
                let _ = directory.increment_unread(&room_id);
            }
        }

        // A message from a user implies they stopped typing in that room.
        let typing_changed = self
            .presence
            .write()
            .stop_typing(&room_id, &payload.sender_id);

        self.emit(ClientEvent::MessageAppended {
            room_id: room_id.clone(),
            message,
        });
        self.emit(ClientEvent::RoomListChanged);
        if typing_changed {
            let users = self.presence.read().typing_users(&room_id);
            self.emit(ClientEvent::TypingChanged { room_id, users });
        }
    }
}
