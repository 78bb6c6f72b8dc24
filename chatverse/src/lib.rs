//! `ChatVerse` — realtime chat synchronization core.
//!
//! A client-side engine for multi-room chat: session management, a room
//! directory with unread tracking, an ordered message store with
//! optimistic sends and reactions, presence/typing state, and a sync
//! engine that reconciles local intents against the backend event stream.

pub mod backend;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod presence;
pub mod session;
pub mod store;
