//! Property-based serialization tests for the wire protocol.
//!
//! Uses proptest to verify:
//! 1. Any valid `ClientFrame` survives encode → decode round-trip.
//! 2. Any valid `ServerFrame` survives encode → decode round-trip.
//! 3. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 4. Framed encode → decode round-trips correctly for any valid frame.

use proptest::prelude::*;
use uuid::Uuid;

use chatverse_proto::codec;
use chatverse_proto::frame::{ClientFrame, ErrorKind, ServerFrame};
use chatverse_proto::id::{CorrelationId, MessageId, RoomId, ServerSeq, Timestamp, UserId};
use chatverse_proto::message::{MessageContent, WireMessage};
use chatverse_proto::presence::PresenceStatus;

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `CorrelationId` values.
fn arb_correlation_id() -> impl Strategy<Value = CorrelationId> {
    any::<u128>().prop_map(|n| CorrelationId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `UserId` values.
fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9-]{1,16}".prop_map(UserId::new)
}

/// Strategy for generating arbitrary `RoomId` values.
fn arb_room_id() -> impl Strategy<Value = RoomId> {
    "[a-z0-9-]{1,24}".prop_map(RoomId::new)
}

/// Strategy for generating arbitrary `Timestamp` values.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

/// Strategy for generating arbitrary `ServerSeq` values.
fn arb_server_seq() -> impl Strategy<Value = ServerSeq> {
    any::<u64>().prop_map(ServerSeq::new)
}

/// Strategy for generating arbitrary `MessageContent` values.
/// Uses non-empty strings to avoid validation failures during round-trip.
fn arb_message_content() -> impl Strategy<Value = MessageContent> {
    prop_oneof![
        "[^\x00]{1,512}".prop_map(MessageContent::Text),
        ("[a-z:/.]{1,64}", "[a-z._-]{1,32}")
            .prop_map(|(url, name)| MessageContent::File { url, name }),
        ("[a-z:/.]{1,64}", "[a-z._-]{1,32}")
            .prop_map(|(url, name)| MessageContent::Image { url, name }),
    ]
}

/// Strategy for generating arbitrary `WireMessage` values.
fn arb_wire_message() -> impl Strategy<Value = WireMessage> {
    (
        arb_message_id(),
        arb_room_id(),
        arb_user_id(),
        arb_timestamp(),
        arb_message_content(),
    )
        .prop_map(|(id, room_id, sender_id, timestamp, content)| WireMessage {
            id,
            room_id,
            sender_id,
            timestamp,
            content,
        })
}

/// Strategy for generating arbitrary `ClientFrame` values.
fn arb_client_frame() -> impl Strategy<Value = ClientFrame> {
    prop_oneof![
        (arb_room_id(), arb_correlation_id(), arb_message_content()).prop_map(
            |(room_id, correlation_id, content)| ClientFrame::MessageAppend {
                room_id,
                correlation_id,
                content,
            }
        ),
        (arb_message_id(), "[^\x00]{1,8}", arb_correlation_id()).prop_map(
            |(message_id, emoji, correlation_id)| ClientFrame::ReactionToggle {
                message_id,
                emoji,
                correlation_id,
            }
        ),
        (arb_room_id(), any::<bool>()).prop_map(|(room_id, is_typing)| {
            ClientFrame::TypingUpdate { room_id, is_typing }
        }),
    ]
}

/// Strategy for generating arbitrary `ErrorKind` values.
fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::Auth),
        Just(ErrorKind::NotFound),
        Just(ErrorKind::NotMember),
        Just(ErrorKind::Conflict),
    ]
}

/// Strategy for generating arbitrary `ServerFrame` values.
fn arb_server_frame() -> impl Strategy<Value = ServerFrame> {
    prop_oneof![
        (
            arb_room_id(),
            arb_wire_message(),
            prop::option::of(arb_correlation_id()),
            arb_server_seq(),
        )
            .prop_map(|(room_id, payload, correlation_id, server_seq)| {
                ServerFrame::MessageAppend {
                    room_id,
                    payload,
                    correlation_id,
                    server_seq,
                }
            }),
        (
            arb_room_id(),
            arb_message_id(),
            arb_user_id(),
            "[^\x00]{1,8}",
            prop::option::of(arb_correlation_id()),
            arb_server_seq(),
        )
            .prop_map(
                |(room_id, message_id, user_id, emoji, correlation_id, server_seq)| {
                    ServerFrame::ReactionToggle {
                        room_id,
                        message_id,
                        user_id,
                        emoji,
                        correlation_id,
                        server_seq,
                    }
                }
            ),
        (
            arb_user_id(),
            prop_oneof![Just(PresenceStatus::Online), Just(PresenceStatus::Offline)],
            prop::option::of(arb_timestamp()),
        )
            .prop_map(|(user_id, status, last_seen)| ServerFrame::PresenceUpdate {
                user_id,
                status,
                last_seen,
            }),
        (arb_room_id(), arb_user_id(), any::<bool>()).prop_map(
            |(room_id, user_id, is_typing)| ServerFrame::TypingUpdate {
                room_id,
                user_id,
                is_typing,
            }
        ),
        (
            arb_error_kind(),
            "[^\x00]{0,128}",
            prop::option::of(arb_correlation_id()),
            prop::option::of(arb_room_id()),
        )
            .prop_map(|(kind, reason, correlation_id, room_id)| ServerFrame::Error {
                kind,
                reason,
                correlation_id,
                room_id,
            }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid ClientFrame survives an encode → decode round-trip.
    #[test]
    fn client_frame_round_trip(frame in arb_client_frame()) {
        let bytes = codec::encode(&frame).expect("encode should succeed");
        let decoded: ClientFrame = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    /// Any valid ServerFrame survives an encode → decode round-trip.
    #[test]
    fn server_frame_round_trip(frame in arb_server_frame()) {
        let bytes = codec::encode(&frame).expect("encode should succeed");
        let decoded: ServerFrame = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    /// Any valid frame survives a framed encode → decode round-trip.
    #[test]
    fn framed_round_trip(frame in arb_server_frame()) {
        let framed = codec::encode_framed(&frame).expect("encode_framed should succeed");
        let (decoded, consumed): (ServerFrame, usize) =
            codec::decode_framed(&framed).expect("decode_framed should succeed");
        prop_assert_eq!(&frame, &decoded);
        prop_assert_eq!(consumed, framed.len());
    }

    /// Every encoded client frame is a JSON object tagged by `type`.
    #[test]
    fn client_frame_is_tagged_json(frame in arb_client_frame()) {
        let bytes = codec::encode(&frame).expect("encode should succeed");
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).expect("encoded frame is JSON");
        prop_assert!(value.get("type").is_some_and(serde_json::Value::is_string));
    }

    /// Random bytes never cause a panic when decoded — they return Err gracefully.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // We don't care if it returns Ok or Err, just that it doesn't panic.
        let _ = codec::decode::<ServerFrame>(&bytes);
        let _ = codec::decode::<ClientFrame>(&bytes);
    }

    /// Random bytes never cause a panic when decoded as a framed message.
    #[test]
    fn random_bytes_decode_framed_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_framed::<ServerFrame>(&bytes);
    }
}
