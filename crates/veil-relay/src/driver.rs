//! Relay driver.
//!
//! The single-writer orchestrator: every inbound event is processed to
//! completion against the four registries (presence, keys, rooms, groups)
//! before the next one, which rules out registry races by construction. The
//! driver is sans-IO: it never touches sockets or clocks, it only returns
//! actions for the runtime shell to execute.
//!
//! Failure semantics follow the protocol taxonomy: requests from unbound
//! endpoints, deliveries to offline identities, and unauthorized mutations
//! are silent no-ops surfaced only as log actions. The driver has no fatal
//! path.

use std::time::Duration;

use veil_proto::{ClientMessage, InviteResponse, ServerMessage};

use crate::{
    groups::{ActiveGroupRegistry, MembershipChange},
    pending::{PendingGroup, PendingGroupNegotiator, ProposeOutcome, Resolution, RespondOutcome},
    registry::{BindOutcome, EndpointId, PresenceRegistry, PublicKeyDirectory},
    rooms::RoomRegistry,
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrently open endpoints.
    pub max_endpoints: usize,
    /// Expire unresolved group proposals after this long. `None` (the
    /// default) never expires: proposals resolve only by responses or
    /// disconnects.
    pub pending_group_expiry: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_endpoints: 10_000, pending_group_expiry: None }
    }
}

/// Events the relay driver processes.
///
/// Produced by the runtime shell (or directly by tests).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new endpoint was accepted by the transport.
    EndpointOpened {
        /// Endpoint id assigned by the runtime.
        endpoint: EndpointId,
    },

    /// An endpoint's connection closed (by peer or error).
    EndpointClosed {
        /// The closed endpoint.
        endpoint: EndpointId,
    },

    /// A decoded wire message arrived from an endpoint.
    MessageReceived {
        /// Sending endpoint.
        endpoint: EndpointId,
        /// The message.
        message: ClientMessage,
    },

    /// Periodic tick carrying the shell's clock, for the expiry policy.
    Tick {
        /// Milliseconds on the shell's monotonic clock.
        now_ms: u64,
    },
}

/// Actions the relay driver produces.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Deliver a message to an endpoint.
    Send {
        /// Target endpoint.
        endpoint: EndpointId,
        /// Message to deliver.
        message: ServerMessage,
    },

    /// Close an endpoint's connection.
    Close {
        /// Endpoint to close.
        endpoint: EndpointId,
        /// Reason for closure.
        reason: String,
    },

    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for relay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Counters for shell introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    /// Open endpoints.
    pub endpoints: usize,
    /// Online identities.
    pub identities: usize,
    /// Unresolved group proposals.
    pub pending_groups: usize,
    /// Formed groups.
    pub active_groups: usize,
}

/// Action-based relay orchestrator.
#[derive(Debug, Default)]
pub struct RelayDriver {
    presence: PresenceRegistry,
    keys: PublicKeyDirectory,
    rooms: RoomRegistry,
    pending: PendingGroupNegotiator,
    groups: ActiveGroupRegistry,
    config: RelayConfig,
    now_ms: u64,
}

impl RelayDriver {
    /// Create a driver with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Current registry counters.
    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            endpoints: self.presence.endpoint_count(),
            identities: self.presence.identity_count(),
            pending_groups: self.pending.len(),
            active_groups: self.groups.len(),
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the single entry point; callers must feed events one at a
    /// time (single-writer invariant).
    pub fn handle(&mut self, event: RelayEvent) -> Vec<RelayAction> {
        match event {
            RelayEvent::EndpointOpened { endpoint } => self.handle_opened(endpoint),
            RelayEvent::EndpointClosed { endpoint } => self.handle_closed(endpoint),
            RelayEvent::MessageReceived { endpoint, message } => {
                self.handle_message(endpoint, message)
            }
            RelayEvent::Tick { now_ms } => self.handle_tick(now_ms),
        }
    }

    fn handle_opened(&mut self, endpoint: EndpointId) -> Vec<RelayAction> {
        if self.presence.endpoint_count() >= self.config.max_endpoints {
            return vec![RelayAction::Close {
                endpoint,
                reason: "max endpoints exceeded".to_owned(),
            }];
        }
        self.presence.open(endpoint);
        vec![log(LogLevel::Debug, format!("endpoint {endpoint} opened"))]
    }

    fn handle_message(
        &mut self,
        endpoint: EndpointId,
        message: ClientMessage,
    ) -> Vec<RelayAction> {
        // Register is the only request allowed from an unbound endpoint.
        if let ClientMessage::Register { username } = &message {
            return self.handle_register(endpoint, username);
        }

        let Some(sender) = self.presence.identity_of(endpoint).map(str::to_owned) else {
            return vec![log(
                LogLevel::Debug,
                format!("dropping request from unbound endpoint {endpoint}"),
            )];
        };

        match message {
            ClientMessage::Register { .. } => Vec::new(),

            ClientMessage::RegisterPublicKey { public_key } => {
                if self.keys.register(&sender, public_key) {
                    vec![log(LogLevel::Debug, format!("public key registered for '{sender}'"))]
                } else {
                    // First registration wins; later attempts are silent
                    vec![log(
                        LogLevel::Debug,
                        format!("ignoring duplicate public key for '{sender}'"),
                    )]
                }
            }

            ClientMessage::GetPublicKey { username } => {
                let public_key = self.keys.lookup(&username).map(<[u8]>::to_vec);
                vec![RelayAction::Send {
                    endpoint,
                    message: ServerMessage::PublicKeyResponse { username, public_key },
                }]
            }

            ClientMessage::SendChatRequest { to } => {
                self.forward(&to, ServerMessage::ReceiveChatRequest { from: sender })
            }

            ClientMessage::AcceptChatRequest { to } => {
                self.forward(&to, ServerMessage::ChatRequestAccepted { from: sender })
            }

            ClientMessage::RejectChatRequest { to } => {
                self.forward(&to, ServerMessage::ChatRequestReject { from: sender })
            }

            ClientMessage::JoinRoom { room_name, username: _ } => {
                self.rooms.join(endpoint, &room_name);
                Vec::new()
            }

            ClientMessage::MessageToRoom { room_name, message, from: _ } => {
                let mut actions = Vec::new();
                for peer in self.rooms.members(&room_name) {
                    if peer != endpoint {
                        actions.push(RelayAction::Send {
                            endpoint: peer,
                            message: ServerMessage::ReceiveMessage {
                                room_name: room_name.clone(),
                                message: message.clone(),
                                from: sender.clone(),
                            },
                        });
                    }
                }
                actions
            }

            ClientMessage::LeaveRoom { room_name } => {
                let mut actions = Vec::new();
                if self.rooms.leave(endpoint, &room_name) {
                    for peer in self.rooms.members(&room_name) {
                        actions.push(RelayAction::Send {
                            endpoint: peer,
                            message: ServerMessage::PartnerDisconnected {
                                room_name: room_name.clone(),
                            },
                        });
                    }
                }
                actions
            }

            ClientMessage::ProposeGroup { group_id, group_name, invited_users } => {
                self.handle_propose(&sender, &group_id, &group_name, &invited_users)
            }

            ClientMessage::RespondGroupInvite { group_id, user: _, response } => {
                self.handle_invite_response(&sender, &group_id, response)
            }

            ClientMessage::DistributeGroupKey { to, group_id, generation, key_payload } => {
                let authorized = self.groups.get(&group_id).is_some_and(|group| {
                    group.owner == sender && group.members.contains(&to)
                });
                if !authorized {
                    return vec![log(
                        LogLevel::Warn,
                        format!(
                            "dropping group key from '{sender}' for '{to}': \
                             not owner of '{group_id}' or target not a member"
                        ),
                    )];
                }
                self.forward(&to, ServerMessage::ReceiveGroupKey {
                    from: sender,
                    group_id,
                    generation,
                    key_payload,
                })
            }

            ClientMessage::AdminAddMember { group_id, member_name } => {
                if !self.presence.is_online(&member_name) {
                    return vec![log(
                        LogLevel::Warn,
                        format!("cannot add offline identity '{member_name}' to '{group_id}'"),
                    )];
                }
                match self.groups.add_member(&group_id, &sender, &member_name) {
                    Some(change) => self.notify_membership(&change, true),
                    None => vec![log(
                        LogLevel::Debug,
                        format!("ignoring add-member on '{group_id}' from '{sender}'"),
                    )],
                }
            }

            ClientMessage::AdminRemoveMember { group_id, member_name } => {
                match self.groups.remove_member(&group_id, &sender, &member_name) {
                    Some(change) => self.notify_membership(&change, true),
                    None => vec![log(
                        LogLevel::Debug,
                        format!("ignoring remove-member on '{group_id}' from '{sender}'"),
                    )],
                }
            }

            ClientMessage::OwnerLeave { group_id } => {
                self.handle_owner_leave(endpoint, &sender, &group_id)
            }

            ClientMessage::MemberLeave { group_id, member_name: _ } => {
                match self.groups.self_leave(&group_id, &sender) {
                    Some(change) => self.notify_membership(&change, true),
                    None => vec![log(
                        LogLevel::Debug,
                        format!("ignoring member-leave on '{group_id}' from '{sender}'"),
                    )],
                }
            }
        }
    }

    fn handle_register(&mut self, endpoint: EndpointId, username: &str) -> Vec<RelayAction> {
        match self.presence.bind(endpoint, username) {
            BindOutcome::CameOnline => {
                let mut actions =
                    vec![log(LogLevel::Info, format!("'{username}' came online"))];
                self.broadcast_presence(&mut actions);
                actions
            }
            BindOutcome::AdditionalEndpoint => vec![log(
                LogLevel::Debug,
                format!("'{username}' bound additional endpoint {endpoint}"),
            )],
            BindOutcome::Ignored => vec![log(
                LogLevel::Debug,
                format!("ignoring re-registration on endpoint {endpoint}"),
            )],
        }
    }

    fn handle_propose(
        &mut self,
        sender: &str,
        group_id: &str,
        group_name: &str,
        invited_users: &[String],
    ) -> Vec<RelayAction> {
        if self.groups.contains(group_id) || self.pending.contains(group_id) {
            return vec![log(
                LogLevel::Warn,
                format!("dropping proposal for already used group id '{group_id}'"),
            )];
        }

        // An invitee that is fully offline can never answer; fail fast, the
        // same way a mid-proposal disconnect would.
        let mut offline: Vec<&str> = invited_users
            .iter()
            .filter(|invitee| invitee.as_str() != sender)
            .filter(|invitee| !self.presence.is_online(invitee))
            .map(String::as_str)
            .collect();
        if !offline.is_empty() {
            offline.sort_unstable();
            let reason = format!("invited users are offline: {}", offline.join(", "));
            let mut actions = Vec::new();
            self.send_to_identity(&mut actions, sender, ServerMessage::GroupCreationFailed {
                group_id: group_id.to_owned(),
                group_name: group_name.to_owned(),
                reason,
            });
            return actions;
        }

        match self.pending.propose(group_id, group_name, sender, invited_users, self.now_ms) {
            ProposeOutcome::AlreadyExists => vec![log(
                LogLevel::Warn,
                format!("dropping proposal for already used group id '{group_id}'"),
            )],
            ProposeOutcome::AwaitingResponses => {
                let mut actions = Vec::new();
                for invitee in invited_users {
                    if invitee == sender {
                        continue;
                    }
                    self.send_to_identity(&mut actions, invitee, ServerMessage::ReceiveGroupInvite {
                        group_id: group_id.to_owned(),
                        group_name: group_name.to_owned(),
                        from: sender.to_owned(),
                    });
                }
                actions
            }
            ProposeOutcome::Resolved(group, resolution) => {
                self.resolve_proposal(group, resolution)
            }
        }
    }

    fn handle_invite_response(
        &mut self,
        sender: &str,
        group_id: &str,
        response: InviteResponse,
    ) -> Vec<RelayAction> {
        let accepted = response == InviteResponse::Accept;
        let mut actions = Vec::new();

        // The proposer learns of every decline, but only once the negotiator
        // has recorded it: duplicates and non-invitees must not re-notify.
        match self.pending.respond(group_id, sender, accepted) {
            RespondOutcome::Ignored => {
                actions.push(log(
                    LogLevel::Debug,
                    format!("ignoring invite response from '{sender}' for '{group_id}'"),
                ));
            }
            RespondOutcome::Recorded => {
                if !accepted {
                    if let Some(proposer) = self.pending.proposer_of(group_id).map(str::to_owned) {
                        self.send_to_identity(&mut actions, &proposer, ServerMessage::InviteRejected {
                            group_id: group_id.to_owned(),
                            user: sender.to_owned(),
                        });
                    }
                }
            }
            RespondOutcome::Resolved(group, resolution) => {
                if !accepted {
                    let proposer = group.proposer.clone();
                    self.send_to_identity(&mut actions, &proposer, ServerMessage::InviteRejected {
                        group_id: group_id.to_owned(),
                        user: sender.to_owned(),
                    });
                }
                actions.extend(self.resolve_proposal(group, resolution));
            }
        }
        actions
    }

    /// Apply a terminal consensus result: form the group or notify failure.
    fn resolve_proposal(
        &mut self,
        group: PendingGroup,
        resolution: Resolution,
    ) -> Vec<RelayAction> {
        let mut actions = Vec::new();
        match resolution {
            Resolution::Formed { members } => {
                let Some(active) =
                    self.groups.form(&group.group_id, &group.group_name, &group.proposer, members)
                else {
                    actions.push(log(
                        LogLevel::Error,
                        format!("formed proposal '{}' collided with an active group", group.group_id),
                    ));
                    return actions;
                };
                let message = ServerMessage::GroupCreated {
                    group_id: active.group_id.clone(),
                    group_name: active.group_name.clone(),
                    owner: active.owner.clone(),
                    members: active.member_list(),
                    generation: active.generation,
                };
                for member in active.member_list() {
                    self.send_to_identity(&mut actions, &member, message.clone());
                }
            }
            Resolution::Failed { reason } => {
                for contacted in group.contacted() {
                    self.send_to_identity(&mut actions, &contacted, ServerMessage::GroupCreationFailed {
                        group_id: group.group_id.clone(),
                        group_name: group.group_name.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
        actions
    }

    fn handle_owner_leave(
        &mut self,
        endpoint: EndpointId,
        sender: &str,
        group_id: &str,
    ) -> Vec<RelayAction> {
        // Fences: group must exist, sender must be its owner, and the owner
        // must not hold another live endpoint.
        let holds_other_endpoint =
            self.presence.endpoints_of(sender).any(|open| open != endpoint);
        if holds_other_endpoint {
            return vec![log(
                LogLevel::Debug,
                format!("ignoring owner-leave for '{group_id}': '{sender}' has other endpoints"),
            )];
        }
        match self.groups.terminate(group_id, sender) {
            Some(group) => {
                let mut actions = Vec::new();
                for member in &group.members {
                    if member != sender {
                        self.send_to_identity(&mut actions, member, ServerMessage::GroupTerminated {
                            group_id: group.group_id.clone(),
                        });
                    }
                }
                actions.push(log(
                    LogLevel::Info,
                    format!("group '{group_id}' terminated by owner '{sender}'"),
                ));
                actions
            }
            None => vec![log(
                LogLevel::Debug,
                format!("ignoring owner-leave on '{group_id}' from '{sender}'"),
            )],
        }
    }

    fn handle_closed(&mut self, endpoint: EndpointId) -> Vec<RelayAction> {
        let mut actions = Vec::new();

        // Room peers learn about the departure regardless of presence.
        for room in self.rooms.drop_endpoint(endpoint) {
            for peer in self.rooms.members(&room) {
                actions.push(RelayAction::Send {
                    endpoint: peer,
                    message: ServerMessage::PartnerDisconnected { room_name: room.clone() },
                });
            }
        }

        let outcome = self.presence.close(endpoint);
        let Some(identity) = outcome.identity else {
            return actions;
        };
        if !outcome.went_offline {
            // Multi-endpoint identity: presence, keys, and memberships are
            // untouched by a single closed connection.
            actions.push(log(
                LogLevel::Debug,
                format!("endpoint {endpoint} of '{identity}' closed; identity still online"),
            ));
            return actions;
        }

        actions.push(log(LogLevel::Info, format!("'{identity}' went offline")));
        self.keys.purge(&identity);

        // Cascading cancellation of unresolved proposals.
        for group in self.pending.cancel_for(&identity) {
            let reason = format!("'{identity}' disconnected before the group formed");
            for contacted in group.contacted() {
                if contacted != identity {
                    self.send_to_identity(&mut actions, &contacted, ServerMessage::GroupCreationFailed {
                        group_id: group.group_id.clone(),
                        group_name: group.group_name.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        // Owner loss terminates; there is no ownership transfer.
        for group_id in self.groups.owned_by(&identity) {
            if let Some(group) = self.groups.terminate(&group_id, &identity) {
                for member in &group.members {
                    if *member != identity {
                        self.send_to_identity(&mut actions, member, ServerMessage::GroupTerminated {
                            group_id: group.group_id.clone(),
                        });
                    }
                }
            }
        }

        // Non-owner memberships fall away with a generation bump.
        for change in self.groups.implicit_leave(&identity) {
            actions.extend(self.notify_membership(&change, false));
        }

        self.broadcast_presence(&mut actions);
        actions
    }

    fn handle_tick(&mut self, now_ms: u64) -> Vec<RelayAction> {
        self.now_ms = now_ms;
        let Some(expiry) = self.config.pending_group_expiry else {
            return Vec::new();
        };
        let cutoff = now_ms.saturating_sub(expiry.as_millis() as u64);
        let mut actions = Vec::new();
        for group in self.pending.expire_before(cutoff) {
            let reason = "group proposal expired".to_owned();
            for contacted in group.contacted() {
                self.send_to_identity(&mut actions, &contacted, ServerMessage::GroupCreationFailed {
                    group_id: group.group_id.clone(),
                    group_name: group.group_name.clone(),
                    reason: reason.clone(),
                });
            }
        }
        actions
    }

    /// Notify everyone affected by a membership change. With
    /// `include_affected`, the added/removed identity is notified too (it is
    /// no longer, or not yet, in the member list).
    fn notify_membership(
        &self,
        change: &MembershipChange,
        include_affected: bool,
    ) -> Vec<RelayAction> {
        let message = ServerMessage::GroupMembershipChanged {
            group_id: change.group_id.clone(),
            group_name: change.group_name.clone(),
            owner: change.owner.clone(),
            members: change.members.clone(),
            generation: change.generation,
        };
        let mut actions = Vec::new();
        for member in &change.members {
            self.send_to_identity(&mut actions, member, message.clone());
        }
        if include_affected && !change.members.contains(&change.affected) {
            self.send_to_identity(&mut actions, &change.affected, message);
        }
        actions
    }

    /// Deliver to every endpoint of an identity; offline targets are dropped
    /// silently.
    fn forward(&self, to: &str, message: ServerMessage) -> Vec<RelayAction> {
        let mut actions = Vec::new();
        self.send_to_identity(&mut actions, to, message);
        if actions.is_empty() {
            actions.push(log(LogLevel::Debug, format!("dropping delivery to offline '{to}'")));
        }
        actions
    }

    fn send_to_identity(
        &self,
        actions: &mut Vec<RelayAction>,
        identity: &str,
        message: ServerMessage,
    ) {
        for endpoint in self.presence.endpoints_of(identity) {
            actions.push(RelayAction::Send { endpoint, message: message.clone() });
        }
    }

    fn broadcast_presence(&self, actions: &mut Vec<RelayAction>) {
        let message = ServerMessage::PresenceList { users: self.presence.online_identities() };
        for endpoint in self.presence.all_endpoints() {
            actions.push(RelayAction::Send { endpoint, message: message.clone() });
        }
    }
}

fn log(level: LogLevel, message: String) -> RelayAction {
    RelayAction::Log { level, message }
}
