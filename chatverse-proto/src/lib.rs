//! Shared protocol definitions for the `ChatVerse` wire format.

pub mod codec;
pub mod frame;
pub mod id;
pub mod message;
pub mod presence;
