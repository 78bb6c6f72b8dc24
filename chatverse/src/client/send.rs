//! Outbound intents: optimistic application, correlation tagging, and
//! delivery (or queueing while disconnected).

use chatverse_proto::frame::ClientFrame;
use chatverse_proto::id::{CorrelationId, MessageId, RoomId};
use chatverse_proto::message::MessageContent;

use crate::backend::{Backend, BackendError};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::store::Message;

use super::{ChatClient, PendingIntent};

impl<B: Backend> ChatClient<B> {
    /// Sends a message to a room.
    ///
    /// The message appears in the local store immediately with a
    /// provisional id and no sequence number; the backend's
    /// confirmation rewrites it in place. If the link is down the frame
    /// is queued for the next successful reconnect.
    ///
    /// Returns the provisional message id and the correlation id that
    /// tracks the intent (usable with
    /// [`cancel_send`](Self::cancel_send)).
    ///
    /// # Errors
    ///
    /// Fails synchronously, without any state change, on invalid
    /// content ([`ClientError::Validation`]), an unknown room
    /// ([`ClientError::NotFound`]), or missing membership
    /// ([`ClientError::NotMember`]).
    pub async fn send_message(
        &self,
        room_id: &RoomId,
        content: MessageContent,
    ) -> Result<(MessageId, CorrelationId), ClientError> {
        content.validate()?;
        self.check_membership(room_id)?;

        let message = Message::pending(room_id.clone(), self.user_id().clone(), content.clone());
        let local_id = message.id.clone();
        let correlation_id = CorrelationId::new();

        {
            let mut store = self.store.write();
            store.insert_pending(message.clone());
        }
        self.directory
            .write()
            .set_last_message(room_id, Some(local_id.clone()))?;
        let typing_changed = self
            .presence
            .write()
            .note_message_sent(room_id, self.user_id());

        self.pending.lock().insert(
            correlation_id.clone(),
            PendingIntent::Append {
                room_id: room_id.clone(),
                local_id: local_id.clone(),
            },
        );

        self.emit(ClientEvent::MessageAppended {
            room_id: room_id.clone(),
            message,
        });
        self.emit(ClientEvent::RoomListChanged);
        if typing_changed {
            let users = self.presence.read().typing_users(room_id);
            self.emit(ClientEvent::TypingChanged {
                room_id: room_id.clone(),
                users,
            });
        }

        tracing::debug!(room_id = %room_id, correlation_id = %correlation_id, "message sent optimistically");
        self.deliver_or_queue(
            correlation_id.clone(),
            ClientFrame::MessageAppend {
                room_id: room_id.clone(),
                correlation_id: correlation_id.clone(),
                content,
            },
        )
        .await?;

        Ok((local_id, correlation_id))
    }

    /// Toggles the local user's reaction on a message.
    ///
    /// Applied optimistically; a rejection re-toggles it back.
    ///
    /// # Errors
    ///
    /// Fails synchronously on an unknown message
    /// ([`ClientError::NotFound`]) or missing membership in the
    /// message's room ([`ClientError::NotMember`]).
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<CorrelationId, ClientError> {
        let room_id = self
            .store
            .read()
            .message(message_id)
            .map(|m| m.room_id.clone())
            .ok_or_else(|| ClientError::NotFound(format!("message {message_id} not in store")))?;
        self.check_membership(&room_id)?;

        self.store
            .write()
            .toggle_reaction(message_id, self.user_id(), emoji)?;

        let correlation_id = CorrelationId::new();
        self.pending.lock().insert(
            correlation_id.clone(),
            PendingIntent::Reaction {
                message_id: message_id.clone(),
                emoji: emoji.to_string(),
            },
        );

        self.emit(ClientEvent::ReactionChanged {
            room_id,
            message_id: message_id.clone(),
        });

        self.deliver_or_queue(
            correlation_id.clone(),
            ClientFrame::ReactionToggle {
                message_id: message_id.clone(),
                emoji: emoji.to_string(),
                correlation_id: correlation_id.clone(),
            },
        )
        .await?;

        Ok(correlation_id)
    }

    /// Marks the local user as typing in a room.
    ///
    /// Fire-and-forget: the indicator is applied locally and sent
    /// best-effort; a down link drops the frame rather than queueing it
    /// (a stale typing hint is worthless after reconnect).
    ///
    /// # Errors
    ///
    /// Fails synchronously on an unknown room or missing membership.
    pub async fn start_typing(&self, room_id: &RoomId) -> Result<(), ClientError> {
        self.set_typing(room_id, true).await
    }

    /// Clears the local user's typing indicator in a room.
    ///
    /// # Errors
    ///
    /// Fails synchronously on an unknown room or missing membership.
    pub async fn stop_typing(&self, room_id: &RoomId) -> Result<(), ClientError> {
        self.set_typing(room_id, false).await
    }

    async fn set_typing(&self, room_id: &RoomId, is_typing: bool) -> Result<(), ClientError> {
        self.check_membership(room_id)?;

        let changed = {
            let mut presence = self.presence.write();
            if is_typing {
                presence.start_typing(room_id, self.user_id(), chatverse_proto::id::Timestamp::now())
            } else {
                presence.stop_typing(room_id, self.user_id())
            }
        };
        if changed {
            let users = self.presence.read().typing_users(room_id);
            self.emit(ClientEvent::TypingChanged {
                room_id: room_id.clone(),
                users,
            });
        }

        let frame = ClientFrame::TypingUpdate {
            room_id: room_id.clone(),
            is_typing,
        };
        if let Err(e) = self.backend.send(frame).await {
            tracing::debug!(room_id = %room_id, error = %e, "typing update dropped");
        }
        Ok(())
    }

    /// Marks a room read: unread resets to zero and stored messages are
    /// flagged. Local-only; never touches any other room.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if no such room exists.
    pub fn mark_read(&self, room_id: &RoomId) -> Result<(), ClientError> {
        self.directory.write().mark_read(room_id)?;
        self.store.write().mark_read(room_id);
        self.emit(ClientEvent::RoomListChanged);
        Ok(())
    }

    /// Withdraws an optimistic intent before the backend acknowledges
    /// it, rolling its local effects back.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Conflict`] if the intent was already
    /// acknowledged (or never existed).
    pub fn cancel_send(&self, correlation_id: &CorrelationId) -> Result<(), ClientError> {
        let Some(intent) = self.pending.lock().remove(correlation_id) else {
            return Err(ClientError::Conflict(format!(
                "intent {correlation_id} was already acknowledged"
            )));
        };

        self.cancelled.lock().insert(correlation_id.clone());
        self.outbox
            .lock()
            .retain(|(cid, _)| cid != correlation_id);
        self.rollback(&intent);
        tracing::debug!(correlation_id = %correlation_id, "intent cancelled");
        Ok(())
    }

    /// Undoes the local effects of an optimistic intent.
    pub(crate) fn rollback(&self, intent: &PendingIntent) {
        match intent {
            PendingIntent::Append { room_id, local_id } => {
                let removed = self.store.write().remove(local_id);
                if removed.is_err() {
                    tracing::warn!(message_id = %local_id, "rollback target already gone");
                    return;
                }
                let tail = self.store.read().last_message(room_id);
                if self
                    .directory
                    .write()
                    .set_last_message(room_id, tail)
                    .is_ok()
                {
                    self.emit(ClientEvent::RoomListChanged);
                }
            }
            PendingIntent::Reaction { message_id, emoji } => {
                let room_id = self
                    .store
                    .read()
                    .message(message_id)
                    .map(|m| m.room_id.clone());
                if self
                    .store
                    .write()
                    .toggle_reaction(message_id, self.user_id(), emoji)
                    .is_ok()
                    && let Some(room_id) = room_id
                {
                    self.emit(ClientEvent::ReactionChanged {
                        room_id,
                        message_id: message_id.clone(),
                    });
                }
            }
        }
    }

    /// Validates that the room exists and the local user belongs to it.
    fn check_membership(&self, room_id: &RoomId) -> Result<(), ClientError> {
        let directory = self.directory.read();
        let room = directory.room(room_id)?;
        if !room.is_member(self.user_id()) {
            return Err(ClientError::NotMember {
                user: self.user_id().clone(),
                room: room_id.clone(),
            });
        }
        Ok(())
    }

    /// Hands a mutating frame to the backend, or queues it when the
    /// link is down. Queued frames flush FIFO after reconnect.
    ///
    /// A rejection at the delivery step undoes the optimistic mutation
    /// before the error surfaces; the intent is no longer pending.
    async fn deliver_or_queue(
        &self,
        correlation_id: CorrelationId,
        frame: ClientFrame,
    ) -> Result<(), ClientError> {
        if !self.backend.is_connected() {
            tracing::debug!(correlation_id = %correlation_id, "link down, frame queued");
            self.outbox.lock().push_back((correlation_id, frame));
            return Ok(());
        }
        match self.backend.send(frame.clone()).await {
            Ok(()) => Ok(()),
            Err(BackendError::Disconnected) => {
                tracing::debug!(correlation_id = %correlation_id, "send failed, frame queued");
                self.outbox.lock().push_back((correlation_id, frame));
                Ok(())
            }
            Err(BackendError::Rejected(reason)) => {
                if let Some(intent) = self.pending.lock().remove(&correlation_id) {
                    self.rollback(&intent);
                }
                tracing::warn!(correlation_id = %correlation_id, reason, "frame rejected at delivery");
                Err(ClientError::Conflict(reason))
            }
        }
    }
}
