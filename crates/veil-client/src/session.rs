use veil_crypto::SymmetricKey;

/// Which side of the handshake this client played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the chat request; generates and seals the session key.
    Initiator,
    /// Accepted the chat request; receives the sealed session key.
    Responder,
}

/// State of a single 1:1 session.
///
/// A session starts insecure the moment the chat request is accepted and
/// becomes secure once a symmetric key is installed: generated locally for
/// the initiator, unboxed from the peer's `session-key` envelope for the
/// responder. Sends are refused while insecure.
#[derive(Debug)]
pub struct Session {
    /// The remote identity.
    pub peer: String,
    /// Relay room shared by both endpoints.
    pub room: String,
    /// Local handshake role.
    pub role: Role,
    /// Installed session key, if the handshake has completed.
    pub key: Option<SymmetricKey>,
}

impl Session {
    /// Creates a fresh keyless session.
    pub fn new(peer: String, room: String, role: Role) -> Self {
        Self {
            peer,
            room,
            role,
            key: None,
        }
    }

    /// Whether the session can carry encrypted traffic.
    pub fn secure(&self) -> bool {
        self.key.is_some()
    }
}

/// Canonical room name for a 1:1 session: initiator first, double-dash
/// separator. Both sides derive the same name independently.
pub fn room_name(initiator: &str, responder: &str) -> String {
    format!("{initiator}--{responder}")
}
