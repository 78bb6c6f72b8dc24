//! Backend abstraction for `ChatVerse`.
//!
//! Defines the [`Backend`] trait the sync engine speaks through.
//! The only concrete implementation here is
//! [`local::LocalBackend`] — an in-process reference backend used by
//! tests and the demo. A networked backend would implement the same
//! trait at this seam.

pub mod local;

/// Errors that can occur talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The link to the backend is down.
    #[error("backend disconnected")]
    Disconnected,

    /// The backend refused to accept the frame.
    #[error("backend rejected frame: {0}")]
    Rejected(String),
}

/// Async link between the sync engine and a chat backend.
///
/// `send` hands off a client intent; delivery does not imply acceptance,
/// which arrives asynchronously as a [`ServerFrame`] via `recv`. A
/// single session receives one ordered stream of frames; per-room order
/// on that stream is authoritative.
///
/// [`ServerFrame`]: chatverse_proto::frame::ServerFrame
pub trait Backend: Send + Sync {
    /// Deliver a client frame to the backend.
    fn send(
        &self,
        frame: chatverse_proto::frame::ClientFrame,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Receive the next server frame for this session.
    ///
    /// Blocks asynchronously until a frame arrives.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<chatverse_proto::frame::ServerFrame, BackendError>> + Send;

    /// Whether the session link is currently up.
    fn is_connected(&self) -> bool;

    /// Re-establish the session link after a disconnect.
    fn reconnect(&self) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;
}
