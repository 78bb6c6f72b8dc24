//! Session lifecycle and identity validation.

use chatverse_proto::id::{Timestamp, UserId};

use crate::error::ClientError;

/// Maximum accepted display-name length in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// A chat participant's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable opaque identifier.
    pub id: UserId,
    /// Display name shown next to messages.
    pub name: String,
    /// Emoji avatar.
    pub avatar: String,
}

impl User {
    /// Creates a user record.
    pub fn new(id: impl Into<String>, name: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            avatar: avatar.into(),
        }
    }
}

/// Proof of an established session.
///
/// Holding a handle means the identity passed validation and the user is
/// considered online until [`SessionManager::disconnect`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// The authenticated user.
    pub user: User,
    /// When the session was established.
    pub connected_at: Timestamp,
}

/// Validates identities and tracks the active session.
///
/// There is no real credential check; validation guards against blank or
/// garbage display names before they reach the backend.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<SessionHandle>,
}

impl SessionManager {
    /// Creates a manager with no active session.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Establishes a session for the given user.
    ///
    /// The display name is trimmed and stripped of control characters
    /// before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Auth`] if the name is empty after
    /// sanitization, exceeds [`MAX_USERNAME_LEN`], or a session is
    /// already active.
    pub fn connect(&mut self, user: User) -> Result<SessionHandle, ClientError> {
        if self.current.is_some() {
            return Err(ClientError::Auth("a session is already active".into()));
        }

        let name = sanitize_username(&user.name);
        if name.is_empty() {
            return Err(ClientError::Auth("username cannot be empty".into()));
        }
        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(ClientError::Auth(format!(
                "username exceeds {MAX_USERNAME_LEN} characters"
            )));
        }

        let handle = SessionHandle {
            user: User { name, ..user },
            connected_at: Timestamp::now(),
        };
        tracing::info!(user_id = %handle.user.id, "session established");
        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Tears down the active session.
    ///
    /// Returns the moment of disconnection, which callers record as the
    /// user's last-seen time. Idempotent: returns `None` when no session
    /// is active.
    pub fn disconnect(&mut self) -> Option<Timestamp> {
        let handle = self.current.take()?;
        let last_seen = Timestamp::now();
        tracing::info!(user_id = %handle.user.id, "session closed");
        Some(last_seen)
    }

    /// Returns the active session handle, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }
}

/// Trims whitespace and removes control characters from a display name.
fn sanitize_username(raw: &str) -> String {
    raw.trim().chars().filter(|c| !c.is_control()).collect()
}
