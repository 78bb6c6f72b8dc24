//! Integration tests for the message send/receive pipeline.
//!
//! Covers the optimistic append flow end to end: immediate local
//! visibility, canonical rewrite on confirmation, fanout to other
//! members with unread accounting, synchronous local validation, and
//! rollback when the backend rejects an intent.

use std::time::Duration;

use tokio::sync::mpsc;

use chatverse::backend::local::{LocalBackend, LocalServer};
use chatverse::backend::{Backend, BackendError};
use chatverse::client::ChatClient;
use chatverse::config::ClientConfig;
use chatverse::directory::{Room, RoomKind};
use chatverse::error::ClientError;
use chatverse::events::ClientEvent;
use chatverse::session::{SessionManager, User};
use chatverse_proto::frame::{ClientFrame, ServerFrame};
use chatverse_proto::id::{RoomId, ServerSeq, UserId};
use chatverse_proto::message::MessageContent;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn demo_rooms() -> Vec<Room> {
    let everyone = vec![
        UserId::new("1"),
        UserId::new("2"),
        UserId::new("3"),
        UserId::new("4"),
    ];
    vec![
        Room::new("general", "General", RoomKind::Public, everyone),
        Room::new(
            "private-alice",
            "Alice",
            RoomKind::Private,
            vec![UserId::new("1"), UserId::new("2")],
        ),
    ]
}

fn seeded_server() -> LocalServer {
    let server = LocalServer::new();
    for room in demo_rooms() {
        server.create_room(&room);
    }
    server
}

/// Connects a user and builds a client with the demo rooms registered.
fn client_for(
    server: &LocalServer,
    id: &str,
    name: &str,
) -> (ChatClient<LocalBackend>, mpsc::Receiver<ClientEvent>) {
    let mut sessions = SessionManager::new();
    let handle = sessions.connect(User::new(id, name, "🙂")).unwrap();
    let backend = server.connect(UserId::new(id), 64);
    let (client, events) = ChatClient::new(backend, handle, &ClientConfig::default());
    for room in demo_rooms() {
        client.add_room(room);
    }
    (client, events)
}

/// Applies inbound frames until the stream goes quiet.
async fn drain(client: &ChatClient<LocalBackend>) {
    loop {
        match tokio::time::timeout(Duration::from_millis(20), client.process_one()).await {
            Ok(Ok(())) => {}
            _ => break,
        }
    }
}

fn text(body: &str) -> MessageContent {
    MessageContent::Text(body.into())
}

/// A backend that refuses every frame at the delivery step.
struct RefusingBackend;

impl Backend for RefusingBackend {
    async fn send(&self, _frame: ClientFrame) -> Result<(), BackendError> {
        Err(BackendError::Rejected("refused".into()))
    }

    async fn recv(&self) -> Result<ServerFrame, BackendError> {
        Err(BackendError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn reconnect(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Optimistic append and confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_appears_immediately_as_pending() {
    let server = seeded_server();
    let (bob, _events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    let (local_id, _) = bob.send_message(&general, text("hello")).await.unwrap();

    let page = bob.list_messages(&general, None, None);
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, local_id);
    assert!(page.messages[0].is_pending());
    assert_eq!(bob.select_room(&general).unwrap().last_message, Some(local_id));
}

#[tokio::test]
async fn confirmation_rewrites_id_seq_and_timestamp() {
    let server = seeded_server();
    let (bob, mut events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    let (local_id, _) = bob.send_message(&general, text("hello")).await.unwrap();
    drain(&bob).await;

    let page = bob.list_messages(&general, None, None);
    assert_eq!(page.messages.len(), 1);
    let confirmed = &page.messages[0];
    assert_ne!(confirmed.id, local_id);
    assert_eq!(confirmed.server_seq, Some(ServerSeq::new(1)));
    assert!(bob.message(&local_id).is_none());

    let mut saw_confirm = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::MessageConfirmed {
            local_id: lid,
            canonical_id,
            ..
        } = event
        {
            assert_eq!(lid, local_id);
            assert_eq!(canonical_id, confirmed.id);
            saw_confirm = true;
        }
    }
    assert!(saw_confirm);
}

#[tokio::test]
async fn member_receives_append_and_unread_increments() {
    let server = seeded_server();
    let (alice, _alice_events) = client_for(&server, "1", "Alice");
    let (bob, _bob_events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    bob.send_message(&general, text("Hey everyone!")).await.unwrap();
    drain(&alice).await;
    drain(&bob).await;

    let page = alice.list_messages(&general, None, None);
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].sender_id, UserId::new("2"));
    assert_eq!(page.messages[0].server_seq, Some(ServerSeq::new(1)));

    // Alice's unread moves, Bob's does not, and both agree on last_message.
    assert_eq!(alice.select_room(&general).unwrap().unread, 1);
    assert_eq!(bob.select_room(&general).unwrap().unread, 0);
    assert_eq!(
        alice.select_room(&general).unwrap().last_message,
        bob.select_room(&general).unwrap().last_message
    );
}

#[tokio::test]
async fn per_room_order_is_identical_for_all_observers() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");
    let (carol, _e3) = client_for(&server, "3", "Carol");
    let general = RoomId::new("general");

    bob.send_message(&general, text("one")).await.unwrap();
    bob.send_message(&general, text("two")).await.unwrap();
    alice.send_message(&general, text("three")).await.unwrap();

    drain(&alice).await;
    drain(&bob).await;
    drain(&carol).await;

    let seqs = |client: &ChatClient<LocalBackend>| -> Vec<u64> {
        client
            .list_messages(&general, None, None)
            .messages
            .iter()
            .filter_map(|m| m.server_seq.map(|s| s.value()))
            .collect()
    };

    assert_eq!(seqs(&alice), vec![1, 2, 3]);
    assert_eq!(seqs(&alice), seqs(&bob));
    assert_eq!(seqs(&alice), seqs(&carol));
}

// ---------------------------------------------------------------------------
// Synchronous local validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_message_fails_validation_without_state_change() {
    let server = seeded_server();
    let (bob, _events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    let result = bob.send_message(&general, text("   ")).await;
    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert!(bob.list_messages(&general, None, None).messages.is_empty());
}

#[tokio::test]
async fn unknown_room_fails_not_found() {
    let server = seeded_server();
    let (bob, _events) = client_for(&server, "2", "Bob");

    let result = bob.send_message(&RoomId::new("missing"), text("hi")).await;
    assert!(matches!(result, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn non_member_send_fails_and_changes_nothing() {
    let server = seeded_server();
    let (alice, _alice_events) = client_for(&server, "1", "Alice");
    let (stranger, _events) = client_for(&server, "5", "Eve");
    let private = RoomId::new("private-alice");

    let result = stranger.send_message(&private, text("let me in")).await;
    assert_eq!(
        result,
        Err(ClientError::NotMember {
            user: UserId::new("5"),
            room: private.clone(),
        })
    );

    assert!(stranger.list_messages(&private, None, None).messages.is_empty());
    assert_eq!(stranger.select_room(&private).unwrap().unread, 0);

    // The room's members never hear about it.
    drain(&alice).await;
    assert!(alice.list_messages(&private, None, None).messages.is_empty());
}

// ---------------------------------------------------------------------------
// Rejection rollback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_append_rolls_back_and_surfaces_error() {
    // Bob's local directory is stale: it claims membership the server
    // does not recognize.
    let server = LocalServer::new();
    server.create_room(&Room::new(
        "private-alice",
        "Alice",
        RoomKind::Private,
        vec![UserId::new("1")],
    ));

    let mut sessions = SessionManager::new();
    let handle = sessions.connect(User::new("2", "Bob", "🙂")).unwrap();
    let backend = server.connect(UserId::new("2"), 64);
    let (bob, mut events) = ChatClient::new(backend, handle, &ClientConfig::default());
    bob.add_room(Room::new(
        "private-alice",
        "Alice",
        RoomKind::Private,
        vec![UserId::new("1"), UserId::new("2")],
    ));
    let private = RoomId::new("private-alice");

    let (local_id, _) = bob.send_message(&private, text("hello?")).await.unwrap();
    assert_eq!(bob.list_messages(&private, None, None).messages.len(), 1);

    drain(&bob).await;

    // Optimistic entry removed, pointer recomputed, typed error emitted.
    assert!(bob.message(&local_id).is_none());
    assert!(bob.list_messages(&private, None, None).messages.is_empty());
    assert_eq!(bob.select_room(&private).unwrap().last_message, None);

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::Error { error, .. } = event {
            assert!(matches!(error, ClientError::NotMember { .. }));
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn rejection_at_delivery_rolls_back_immediately() {
    let mut sessions = SessionManager::new();
    let handle = sessions.connect(User::new("2", "Bob", "🙂")).unwrap();
    let (bob, _events) = ChatClient::new(RefusingBackend, handle, &ClientConfig::default());
    for room in demo_rooms() {
        bob.add_room(room);
    }
    let general = RoomId::new("general");

    let result = bob.send_message(&general, text("hi")).await;
    assert!(matches!(result, Err(ClientError::Conflict(_))));

    // The optimistic entry was rolled back with the error, not leaked.
    assert!(bob.list_messages(&general, None, None).messages.is_empty());
    assert_eq!(bob.select_room(&general).unwrap().last_message, None);
    assert_eq!(bob.outbox_len(), 0);

    // The store is consistent enough for the next attempt.
    let result = bob.send_message(&general, text("again")).await;
    assert!(matches!(result, Err(ClientError::Conflict(_))));
    assert!(bob.list_messages(&general, None, None).messages.is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_after_ack_fails_with_conflict() {
    let server = seeded_server();
    let (bob, _events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    let (_, correlation_id) = bob.send_message(&general, text("keep me")).await.unwrap();
    drain(&bob).await; // acknowledgment processed

    let result = bob.cancel_send(&correlation_id);
    assert!(matches!(result, Err(ClientError::Conflict(_))));
    assert_eq!(bob.list_messages(&general, None, None).messages.len(), 1);
}

#[tokio::test]
async fn cancel_before_ack_removes_optimistic_entry() {
    let server = seeded_server();
    let (bob, _events) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    // Sever the link so the intent stays unacknowledged in the outbox.
    bob.backend().disconnect();
    let (local_id, correlation_id) = bob.send_message(&general, text("draft")).await.unwrap();
    assert_eq!(bob.outbox_len(), 1);

    bob.cancel_send(&correlation_id).unwrap();

    assert!(bob.message(&local_id).is_none());
    assert_eq!(bob.outbox_len(), 0);
    assert_eq!(bob.select_room(&general).unwrap().last_message, None);
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pagination_walks_history_in_order() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    for i in 0..5 {
        bob.send_message(&general, text(&format!("msg {i}")))
            .await
            .unwrap();
    }
    drain(&alice).await;

    let first = alice.list_messages(&general, None, Some(2));
    assert_eq!(first.messages.len(), 2);
    let second = alice.list_messages(&general, first.next_cursor, Some(2));
    assert_eq!(second.messages.len(), 2);
    let last = alice.list_messages(&general, second.next_cursor, Some(2));
    assert_eq!(last.messages.len(), 1);
    assert!(last.next_cursor.is_none());

    let all: Vec<u64> = first
        .messages
        .iter()
        .chain(&second.messages)
        .chain(&last.messages)
        .filter_map(|m| m.server_seq.map(|s| s.value()))
        .collect();
    assert_eq!(all, vec![1, 2, 3, 4, 5]);
}
