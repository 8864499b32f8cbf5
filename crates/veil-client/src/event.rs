use veil_proto::{ClientMessage, InviteResponse, ServerMessage};

/// Inputs to the client state machine.
///
/// `FromServer` carries decoded relay traffic; every other variant is a
/// local user intent. Both flow through the same [`crate::Client::handle`]
/// entry point so the embedding runtime needs a single dispatch loop.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A decoded message from the relay.
    FromServer(ServerMessage),

    /// Request a 1:1 chat with `peer`.
    RequestChat {
        /// The peer to invite.
        peer: String,
    },
    /// Accept a pending 1:1 chat request from `peer`.
    AcceptChat {
        /// The requesting peer.
        peer: String,
    },
    /// Reject a pending 1:1 chat request from `peer`.
    RejectChat {
        /// The requesting peer.
        peer: String,
    },
    /// Encrypt and send `text` on the established session with `peer`.
    SendChat {
        /// The session peer.
        peer: String,
        /// Plaintext to encrypt.
        text: String,
    },
    /// Tear down the session with `peer` and leave its room.
    LeaveChat {
        /// The session peer.
        peer: String,
    },

    /// Propose a new group to the listed invitees.
    ProposeGroup {
        /// Relay-unique group identifier.
        group_id: String,
        /// Human-readable group name.
        group_name: String,
        /// Identities to invite (the local identity is implied).
        invitees: Vec<String>,
    },
    /// Answer a received group invitation.
    RespondInvite {
        /// The group being answered.
        group_id: String,
        /// Accept or decline.
        response: InviteResponse,
    },
    /// Owner intent: add `member` to an owned group.
    AddMember {
        /// The owned group.
        group_id: String,
        /// Identity to add.
        member: String,
    },
    /// Owner intent: remove `member` from an owned group.
    RemoveMember {
        /// The owned group.
        group_id: String,
        /// Identity to remove.
        member: String,
    },
    /// Leave a group: as owner this terminates it, as member it shrinks it.
    LeaveGroup {
        /// The group to leave.
        group_id: String,
    },
    /// Encrypt and send `text` to every member of `group_id`.
    SendGroupChat {
        /// The target group.
        group_id: String,
        /// Plaintext to encrypt.
        text: String,
    },
}

/// Outputs of the client state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Encode and transmit a message to the relay.
    Send(ClientMessage),
    /// Surface an event to the embedding UI.
    Notify(Notification),
}

/// UI-facing events: everything the embedding application renders.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The online roster changed.
    Presence {
        /// Currently online identities.
        users: Vec<String>,
    },
    /// A peer asked to start a 1:1 chat.
    ChatRequested {
        /// The requesting peer.
        from: String,
    },
    /// A peer declined our 1:1 chat request.
    ChatRejected {
        /// The declining peer.
        from: String,
    },
    /// The handshake with `peer` completed; the session is now usable.
    SessionSecured {
        /// The session peer.
        peer: String,
    },
    /// A decrypted 1:1 message arrived.
    ChatMessage {
        /// The sending peer.
        from: String,
        /// Decrypted plaintext.
        text: String,
    },
    /// The session peer went fully offline; the session is gone.
    PeerDisconnected {
        /// The departed peer.
        peer: String,
    },
    /// An invitation to join a proposed group arrived.
    GroupInvited {
        /// The proposed group.
        group_id: String,
        /// Its display name.
        group_name: String,
        /// The proposing identity.
        from: String,
    },
    /// A proposed group gathered enough acceptances and now exists. The
    /// member list holds whoever accepted; decliners are simply absent.
    GroupFormed {
        /// The formed group.
        group_id: String,
        /// Its display name.
        group_name: String,
        /// Founding membership.
        members: Vec<String>,
    },
    /// A proposed group failed to form.
    GroupFailed {
        /// The failed proposal.
        group_id: String,
        /// Relay-supplied reason.
        reason: String,
    },
    /// An invitee declined a group we proposed.
    InviteDeclined {
        /// The affected proposal.
        group_id: String,
        /// The declining invitee.
        user: String,
    },
    /// A group's membership changed (join, removal, or departure).
    GroupChanged {
        /// The affected group.
        group_id: String,
        /// Membership after the change.
        members: Vec<String>,
        /// New membership generation.
        generation: u64,
    },
    /// A group no longer exists.
    GroupDissolved {
        /// The dissolved group.
        group_id: String,
    },
    /// A fresh group key was installed; group sends are possible again.
    GroupSecured {
        /// The rekeyed group.
        group_id: String,
        /// Generation the installed key covers.
        generation: u64,
    },
    /// A decrypted group message arrived.
    GroupMessage {
        /// The source group.
        group_id: String,
        /// The sending member.
        from: String,
        /// Decrypted plaintext.
        text: String,
    },
}
