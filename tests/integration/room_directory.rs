//! Integration tests for the room directory as seen through the client:
//! filtered listing, read-only selection, unread bookkeeping, and the
//! last-message pointer.

use std::time::Duration;

use tokio::sync::mpsc;

use chatverse::backend::local::{LocalBackend, LocalServer};
use chatverse::client::ChatClient;
use chatverse::config::ClientConfig;
use chatverse::directory::{Room, RoomFilter, RoomKind};
use chatverse::error::ClientError;
use chatverse::events::ClientEvent;
use chatverse::session::{SessionManager, User};
use chatverse_proto::id::{RoomId, UserId};
use chatverse_proto::message::MessageContent;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rooms() -> Vec<Room> {
    let everyone = vec![UserId::new("1"), UserId::new("2"), UserId::new("3")];
    vec![
        Room::new("general", "General", RoomKind::Public, everyone.clone()),
        Room::new("random", "Random", RoomKind::Public, everyone),
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
    for room in rooms() {
        server.create_room(&room);
    }
    server
}

fn client_for(
    server: &LocalServer,
    id: &str,
    name: &str,
) -> (ChatClient<LocalBackend>, mpsc::Receiver<ClientEvent>) {
    let mut sessions = SessionManager::new();
    let handle = sessions.connect(User::new(id, name, "🙂")).unwrap();
    let backend = server.connect(UserId::new(id), 64);
    let (client, events) = ChatClient::new(backend, handle, &ClientConfig::default());
    for room in rooms() {
        client.add_room(room);
    }
    (client, events)
}

async fn drain(client: &ChatClient<LocalBackend>) {
    loop {
        match tokio::time::timeout(Duration::from_millis(20), client.process_one()).await {
            Ok(Ok(())) => {}
            _ => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing and selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_rooms_preserves_registration_order() {
    let server = seeded_server();
    let (alice, _events) = client_for(&server, "1", "Alice");

    let listed = alice.list_rooms(&RoomFilter::default());
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["general", "random", "private-alice"]);
}

#[tokio::test]
async fn list_rooms_filters_by_kind_and_member() {
    let server = seeded_server();
    let (alice, _events) = client_for(&server, "1", "Alice");

    let public = alice.list_rooms(&RoomFilter {
        kind: Some(RoomKind::Public),
        member: None,
    });
    assert_eq!(public.len(), 2);
    assert!(public.iter().all(|r| r.kind == RoomKind::Public));

    let carols = alice.list_rooms(&RoomFilter {
        kind: None,
        member: Some(UserId::new("3")),
    });
    let ids: Vec<&str> = carols.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["general", "random"]);

    let private_for_carol = alice.list_rooms(&RoomFilter {
        kind: Some(RoomKind::Private),
        member: Some(UserId::new("3")),
    });
    assert!(private_for_carol.is_empty());
}

#[tokio::test]
async fn registering_a_room_again_replaces_it() {
    let server = seeded_server();
    let (alice, _events) = client_for(&server, "1", "Alice");

    alice.add_room(Room::new(
        "general",
        "General (renamed)",
        RoomKind::Public,
        vec![UserId::new("1")],
    ));

    let listed = alice.list_rooms(&RoomFilter::default());
    assert_eq!(listed.len(), 3);
    assert_eq!(
        alice.select_room(&RoomId::new("general")).unwrap().name,
        "General (renamed)"
    );
}

#[tokio::test]
async fn select_unknown_room_fails_not_found() {
    let server = seeded_server();
    let (alice, _events) = client_for(&server, "1", "Alice");

    let result = alice.select_room(&RoomId::new("missing"));
    assert!(matches!(result, Err(ClientError::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Unread bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selection_never_changes_unread() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    bob.send_message(&general, MessageContent::Text("ping".into()))
        .await
        .unwrap();
    drain(&alice).await;
    assert_eq!(alice.select_room(&general).unwrap().unread, 1);

    // Selecting repeatedly is a read.
    for _ in 0..3 {
        let _ = alice.select_room(&general).unwrap();
    }
    assert_eq!(alice.select_room(&general).unwrap().unread, 1);
}

#[tokio::test]
async fn mark_read_zeroes_only_the_target_room() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");

    for room in ["general", "random"] {
        bob.send_message(&RoomId::new(room), MessageContent::Text("hi".into()))
            .await
            .unwrap();
    }
    drain(&alice).await;
    assert_eq!(alice.select_room(&RoomId::new("general")).unwrap().unread, 1);
    assert_eq!(alice.select_room(&RoomId::new("random")).unwrap().unread, 1);

    alice.mark_read(&RoomId::new("general")).unwrap();

    assert_eq!(alice.select_room(&RoomId::new("general")).unwrap().unread, 0);
    assert_eq!(alice.select_room(&RoomId::new("random")).unwrap().unread, 1);
}

#[tokio::test]
async fn unread_accumulates_per_message() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    for i in 0..3 {
        bob.send_message(&general, MessageContent::Text(format!("msg {i}")))
            .await
            .unwrap();
    }
    drain(&alice).await;

    assert_eq!(alice.select_room(&general).unwrap().unread, 3);
}

// ---------------------------------------------------------------------------
// Last-message pointer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_message_tracks_the_room_tail() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");
    let general = RoomId::new("general");

    assert_eq!(alice.select_room(&general).unwrap().last_message, None);

    bob.send_message(&general, MessageContent::Text("first".into()))
        .await
        .unwrap();
    bob.send_message(&general, MessageContent::Text("second".into()))
        .await
        .unwrap();
    drain(&alice).await;

    let tail = alice
        .list_messages(&general, None, None)
        .messages
        .last()
        .map(|m| m.id.clone());
    assert!(tail.is_some());
    assert_eq!(alice.select_room(&general).unwrap().last_message, tail);
}

#[tokio::test]
async fn last_message_is_per_room() {
    let server = seeded_server();
    let (alice, _e1) = client_for(&server, "1", "Alice");
    let (bob, _e2) = client_for(&server, "2", "Bob");

    bob.send_message(&RoomId::new("general"), MessageContent::Text("g".into()))
        .await
        .unwrap();
    drain(&alice).await;

    assert!(alice.select_room(&RoomId::new("general")).unwrap().last_message.is_some());
    assert!(alice.select_room(&RoomId::new("random")).unwrap().last_message.is_none());
}
