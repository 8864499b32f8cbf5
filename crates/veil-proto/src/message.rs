//! Client and relay wire messages.
//!
//! [`ClientMessage`] covers everything an endpoint may send to the relay;
//! [`ServerMessage`] covers everything the relay may deliver to an endpoint.
//! Variant tags are the kebab-case wire names; the relay driver matches both
//! enums exhaustively, so adding a variant forces every handler to be updated.

use serde::{Deserialize, Serialize};

use crate::{Envelope, ProtocolError};

/// An invitee's answer to a group proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteResponse {
    /// Join the proposed group.
    Accept,
    /// Stay out of the proposed group.
    Decline,
}

/// Messages sent from an endpoint to the relay.
///
/// Apart from `register`, every request requires the sending endpoint to have
/// a bound identity; the relay silently drops requests from unbound senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this endpoint to an identity. Idempotent per endpoint.
    Register {
        /// Identity to bind.
        username: String,
    },

    /// Publish the sender's public key. First registration per identity wins;
    /// later attempts are silently ignored.
    RegisterPublicKey {
        /// X25519 public key bytes.
        #[serde(with = "crate::b64")]
        public_key: Vec<u8>,
    },

    /// Look up another identity's public key.
    GetPublicKey {
        /// Identity to look up.
        username: String,
    },

    /// Ask another identity to open a 1:1 chat.
    SendChatRequest {
        /// Target identity.
        to: String,
    },

    /// Accept a previously received chat request.
    AcceptChatRequest {
        /// The original requester.
        to: String,
    },

    /// Reject a previously received chat request.
    RejectChatRequest {
        /// The original requester.
        to: String,
    },

    /// Subscribe this endpoint to a named room. Idempotent.
    JoinRoom {
        /// Room to join.
        room_name: String,
        /// Identity joining (informational; the bound identity is
        /// authoritative).
        username: String,
    },

    /// Relay an opaque envelope to the other subscribers of a room.
    MessageToRoom {
        /// Target room.
        room_name: String,
        /// Opaque crypto payload.
        message: Envelope,
        /// Claimed sender (informational; the bound identity is
        /// authoritative).
        from: String,
    },

    /// Unsubscribe this endpoint from a room, notifying its peers.
    LeaveRoom {
        /// Room to leave.
        room_name: String,
    },

    /// Propose a new group, inviting the listed identities.
    ProposeGroup {
        /// Caller-chosen unique group id.
        group_id: String,
        /// Human-readable group name.
        group_name: String,
        /// Identities to invite. The proposer is implicitly accepted.
        invited_users: Vec<String>,
    },

    /// Answer a group invite.
    RespondGroupInvite {
        /// Group being answered.
        group_id: String,
        /// Responding identity (informational; the bound identity is
        /// authoritative).
        user: String,
        /// Accept or decline.
        response: InviteResponse,
    },

    /// Owner-to-member delivery of a sealed group key.
    DistributeGroupKey {
        /// Receiving member.
        to: String,
        /// Group the key belongs to.
        group_id: String,
        /// Key generation this payload establishes.
        generation: u64,
        /// Sealed key (a `group-key` envelope).
        key_payload: Envelope,
    },

    /// Owner adds a member to an active group.
    AdminAddMember {
        /// Target group.
        group_id: String,
        /// Identity to add.
        member_name: String,
    },

    /// Owner removes a member (never itself) from an active group.
    AdminRemoveMember {
        /// Target group.
        group_id: String,
        /// Identity to remove.
        member_name: String,
    },

    /// Explicit owner-left signal. Fenced: ignored if the group is gone, the
    /// sender is not the owner, or the owner still holds another live
    /// endpoint.
    OwnerLeave {
        /// Group to terminate.
        group_id: String,
    },

    /// A non-owner member removes itself from an active group.
    MemberLeave {
        /// Group to leave.
        group_id: String,
        /// Leaving identity (informational; the bound identity is
        /// authoritative).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member_name: Option<String>,
    },
}

/// Messages delivered from the relay to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full roster of online identities, broadcast on every presence change.
    PresenceList {
        /// Online identities, sorted.
        users: Vec<String>,
    },

    /// Answer to a `get-public-key` request.
    PublicKeyResponse {
        /// Identity that was looked up.
        username: String,
        /// Registered key, or `null` if absent.
        #[serde(with = "crate::b64::opt")]
        public_key: Option<Vec<u8>>,
    },

    /// A 1:1 chat request from another identity.
    ReceiveChatRequest {
        /// Requesting identity.
        from: String,
    },

    /// The target accepted the sender's chat request.
    ChatRequestAccepted {
        /// Accepting identity.
        from: String,
    },

    /// The target rejected the sender's chat request.
    ChatRequestReject {
        /// Rejecting identity.
        from: String,
    },

    /// An envelope relayed from a room peer.
    ReceiveMessage {
        /// Room the envelope was sent to.
        room_name: String,
        /// Opaque crypto payload.
        message: Envelope,
        /// Sending identity.
        from: String,
    },

    /// A room peer left the room or disconnected.
    PartnerDisconnected {
        /// Affected room.
        room_name: String,
    },

    /// Invitation to join a proposed group.
    ReceiveGroupInvite {
        /// Proposed group id.
        group_id: String,
        /// Proposed group name.
        group_name: String,
        /// Proposing identity.
        from: String,
    },

    /// Consensus succeeded; the group now exists.
    GroupCreated {
        /// Group id.
        group_id: String,
        /// Group name.
        group_name: String,
        /// Owning identity (the proposer).
        owner: String,
        /// Founding member set, sorted.
        members: Vec<String>,
        /// Initial key generation.
        generation: u64,
    },

    /// Consensus failed or a participant disconnected before resolution.
    GroupCreationFailed {
        /// Group id that will never exist.
        group_id: String,
        /// Proposed group name.
        group_name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An invitee declined; sent to the proposer only.
    InviteRejected {
        /// Group the decline concerns.
        group_id: String,
        /// Declining identity.
        user: String,
    },

    /// The member set of an active group changed.
    GroupMembershipChanged {
        /// Affected group.
        group_id: String,
        /// Group name (lets a freshly added member bootstrap state).
        group_name: String,
        /// Owning identity.
        owner: String,
        /// New member set, sorted.
        members: Vec<String>,
        /// New key generation; prior keys are revoked.
        generation: u64,
    },

    /// The group is gone (owner left or disconnected).
    GroupTerminated {
        /// Terminated group.
        group_id: String,
    },

    /// A sealed group key from the group owner.
    ReceiveGroupKey {
        /// Sending owner.
        from: String,
        /// Group the key belongs to.
        group_id: String,
        /// Key generation this payload establishes.
        generation: u64,
        /// Sealed key (a `group-key` envelope).
        key_payload: Envelope,
    },
}

impl ClientMessage {
    /// Encode to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode from a JSON string.
    pub fn from_json(input: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(input).map_err(ProtocolError::Decode)
    }
}

impl ServerMessage {
    /// Encode to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode from a JSON string.
    pub fn from_json(input: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(input).map_err(ProtocolError::Decode)
    }
}
