use std::collections::{HashMap, HashSet};

use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use veil_crypto::{Keypair, NONCE_SIZE, PublicKey, SymmetricKey, open, open_secret, seal, seal_secret};
use veil_proto::{ClientMessage, Envelope, InviteResponse, ServerMessage};

use crate::error::ClientError;
use crate::event::{ClientAction, ClientEvent, Notification};
use crate::group::GroupSession;
use crate::inbox::{Buffered, Inbox};
use crate::session::{Role, Session, room_name};

/// The client state machine.
///
/// Owns the local identity keypair and all session, group, and directory
/// state. [`Client::handle`] is the single entry point: it consumes one
/// [`ClientEvent`] and returns the actions the runtime must execute. The
/// machine never blocks and never performs I/O; randomness is injected
/// through `R` so tests can run it deterministically.
pub struct Client<R: RngCore + CryptoRng> {
    username: String,
    keypair: Keypair,
    rng: R,
    /// Cached peer public keys, filled by `public-key-response`.
    directory: HashMap<String, PublicKey>,
    /// Identities with an in-flight directory lookup.
    pending_lookups: HashSet<String>,
    /// Peers we asked to chat with, awaiting accept or reject.
    outgoing_requests: HashSet<String>,
    /// Peers that asked us to chat, awaiting our answer.
    incoming_requests: HashSet<String>,
    /// Active 1:1 sessions by peer.
    sessions: HashMap<String, Session>,
    /// 1:1 room name back to its peer.
    rooms: HashMap<String, String>,
    /// Pending group invites: id to (name, proposer).
    invites: HashMap<String, (String, String)>,
    /// Active groups by id.
    groups: HashMap<String, GroupSession>,
    /// Owned groups whose rekey is blocked on directory lookups.
    pending_rekeys: HashSet<String>,
    /// Key envelopes parked until the sealer's public key arrives.
    inbox: Inbox,
}

impl<R: RngCore + CryptoRng> Client<R> {
    /// Creates a client for `username`, drawing the identity keypair seed
    /// from `rng`.
    pub fn new(username: impl Into<String>, mut rng: R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self {
            username: username.into(),
            keypair: Keypair::from_seed(seed),
            rng,
            directory: HashMap::new(),
            pending_lookups: HashSet::new(),
            outgoing_requests: HashSet::new(),
            incoming_requests: HashSet::new(),
            sessions: HashMap::new(),
            rooms: HashMap::new(),
            invites: HashMap::new(),
            groups: HashMap::new(),
            pending_rekeys: HashSet::new(),
            inbox: Inbox::default(),
        }
    }

    /// The local identity.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The local identity public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    /// The session with `peer`, if one exists.
    pub fn session(&self, peer: &str) -> Option<&Session> {
        self.sessions.get(peer)
    }

    /// The group state for `group_id`, if this client is a member.
    pub fn group(&self, group_id: &str) -> Option<&GroupSession> {
        self.groups.get(group_id)
    }

    /// Opening handshake with the relay: bind the identity and publish the
    /// public key. Run once per connection, before any other event.
    pub fn connect(&self) -> Vec<ClientAction> {
        vec![
            ClientAction::Send(ClientMessage::Register { username: self.username.clone() }),
            ClientAction::Send(ClientMessage::RegisterPublicKey {
                public_key: self.keypair.public.as_bytes().to_vec(),
            }),
        ]
    }

    /// Processes one event and returns the actions to execute.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::FromServer(message) => Ok(self.handle_server(message)),
            ClientEvent::RequestChat { peer } => Ok(self.request_chat(peer)),
            ClientEvent::AcceptChat { peer } => self.accept_chat(&peer),
            ClientEvent::RejectChat { peer } => self.reject_chat(&peer),
            ClientEvent::SendChat { peer, text } => self.send_chat(&peer, &text),
            ClientEvent::LeaveChat { peer } => self.leave_chat(&peer),
            ClientEvent::ProposeGroup { group_id, group_name, invitees } => {
                Ok(vec![ClientAction::Send(ClientMessage::ProposeGroup {
                    group_id,
                    group_name,
                    invited_users: invitees,
                })])
            }
            ClientEvent::RespondInvite { group_id, response } => {
                self.respond_invite(&group_id, response)
            }
            ClientEvent::AddMember { group_id, member } => {
                self.owner_fence(&group_id)?;
                Ok(vec![ClientAction::Send(ClientMessage::AdminAddMember {
                    group_id,
                    member_name: member,
                })])
            }
            ClientEvent::RemoveMember { group_id, member } => {
                self.owner_fence(&group_id)?;
                Ok(vec![ClientAction::Send(ClientMessage::AdminRemoveMember {
                    group_id,
                    member_name: member,
                })])
            }
            ClientEvent::LeaveGroup { group_id } => self.leave_group(&group_id),
            ClientEvent::SendGroupChat { group_id, text } => self.send_group_chat(&group_id, &text),
        }
    }

    // User intents

    fn request_chat(&mut self, peer: String) -> Vec<ClientAction> {
        self.outgoing_requests.insert(peer.clone());
        vec![ClientAction::Send(ClientMessage::SendChatRequest { to: peer })]
    }

    fn accept_chat(&mut self, peer: &str) -> Result<Vec<ClientAction>, ClientError> {
        if !self.incoming_requests.remove(peer) {
            return Err(ClientError::UnknownPeer { peer: peer.to_owned() });
        }
        // The requester is the initiator, so their name leads the room name.
        let room = room_name(peer, &self.username);
        self.sessions
            .insert(peer.to_owned(), Session::new(peer.to_owned(), room.clone(), Role::Responder));
        self.rooms.insert(room.clone(), peer.to_owned());
        Ok(vec![
            ClientAction::Send(ClientMessage::AcceptChatRequest { to: peer.to_owned() }),
            ClientAction::Send(ClientMessage::JoinRoom {
                room_name: room,
                username: self.username.clone(),
            }),
        ])
    }

    fn reject_chat(&mut self, peer: &str) -> Result<Vec<ClientAction>, ClientError> {
        if !self.incoming_requests.remove(peer) {
            return Err(ClientError::UnknownPeer { peer: peer.to_owned() });
        }
        Ok(vec![ClientAction::Send(ClientMessage::RejectChatRequest { to: peer.to_owned() })])
    }

    fn send_chat(&mut self, peer: &str, text: &str) -> Result<Vec<ClientAction>, ClientError> {
        let nonce = self.fresh_nonce();
        let session = self
            .sessions
            .get(peer)
            .ok_or_else(|| ClientError::UnknownPeer { peer: peer.to_owned() })?;
        let Some(key) = &session.key else {
            return Err(ClientError::ChannelInsecure { peer: peer.to_owned() });
        };
        let ciphertext = seal_secret(text.as_bytes(), &nonce, key);
        Ok(vec![ClientAction::Send(ClientMessage::MessageToRoom {
            room_name: session.room.clone(),
            message: Envelope::EncryptedMessage { ciphertext, nonce: nonce.to_vec() },
            from: self.username.clone(),
        })])
    }

    fn leave_chat(&mut self, peer: &str) -> Result<Vec<ClientAction>, ClientError> {
        let session = self
            .sessions
            .remove(peer)
            .ok_or_else(|| ClientError::UnknownPeer { peer: peer.to_owned() })?;
        self.rooms.remove(&session.room);
        Ok(vec![ClientAction::Send(ClientMessage::LeaveRoom { room_name: session.room })])
    }

    fn respond_invite(
        &mut self,
        group_id: &str,
        response: InviteResponse,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.invites.remove(group_id).is_none() {
            return Err(ClientError::UnknownGroup { group_id: group_id.to_owned() });
        }
        Ok(vec![ClientAction::Send(ClientMessage::RespondGroupInvite {
            group_id: group_id.to_owned(),
            user: self.username.clone(),
            response,
        })])
    }

    fn leave_group(&mut self, group_id: &str) -> Result<Vec<ClientAction>, ClientError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| ClientError::UnknownGroup { group_id: group_id.to_owned() })?;
        let owned = group.owned_by(&self.username);
        self.groups.remove(group_id);
        self.pending_rekeys.remove(group_id);
        let leave = if owned {
            ClientMessage::OwnerLeave { group_id: group_id.to_owned() }
        } else {
            ClientMessage::MemberLeave {
                group_id: group_id.to_owned(),
                member_name: Some(self.username.clone()),
            }
        };
        Ok(vec![
            ClientAction::Send(leave),
            ClientAction::Send(ClientMessage::LeaveRoom { room_name: group_id.to_owned() }),
        ])
    }

    fn send_group_chat(&mut self, group_id: &str, text: &str) -> Result<Vec<ClientAction>, ClientError> {
        let nonce = self.fresh_nonce();
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| ClientError::UnknownGroup { group_id: group_id.to_owned() })?;
        // Fail closed: a key behind the membership generation never
        // encrypts fresh traffic.
        if !group.secure() {
            return Err(ClientError::GroupInsecure { group_id: group_id.to_owned() });
        }
        let Some((_, key)) = &group.key else {
            return Err(ClientError::GroupInsecure { group_id: group_id.to_owned() });
        };
        let ciphertext = seal_secret(text.as_bytes(), &nonce, key);
        Ok(vec![ClientAction::Send(ClientMessage::MessageToRoom {
            room_name: group_id.to_owned(),
            message: Envelope::EncryptedMessage { ciphertext, nonce: nonce.to_vec() },
            from: self.username.clone(),
        })])
    }

    fn owner_fence(&self, group_id: &str) -> Result<(), ClientError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| ClientError::UnknownGroup { group_id: group_id.to_owned() })?;
        if !group.owned_by(&self.username) {
            return Err(ClientError::NotGroupOwner {
                username: self.username.clone(),
                group_id: group_id.to_owned(),
            });
        }
        Ok(())
    }

    // Relay traffic

    fn handle_server(&mut self, message: ServerMessage) -> Vec<ClientAction> {
        match message {
            ServerMessage::PresenceList { users } => {
                vec![ClientAction::Notify(Notification::Presence { users })]
            }
            ServerMessage::PublicKeyResponse { username, public_key } => {
                self.handle_public_key(username, public_key)
            }
            ServerMessage::ReceiveChatRequest { from } => {
                self.incoming_requests.insert(from.clone());
                vec![ClientAction::Notify(Notification::ChatRequested { from })]
            }
            ServerMessage::ChatRequestAccepted { from } => self.handle_chat_accepted(from),
            ServerMessage::ChatRequestReject { from } => {
                self.outgoing_requests.remove(&from);
                vec![ClientAction::Notify(Notification::ChatRejected { from })]
            }
            ServerMessage::ReceiveMessage { room_name, message, from } => {
                self.handle_envelope(&room_name, message, &from)
            }
            ServerMessage::PartnerDisconnected { room_name } => {
                let Some(peer) = self.rooms.remove(&room_name) else {
                    debug!(room = %room_name, "partner-disconnected for unknown room");
                    return Vec::new();
                };
                self.sessions.remove(&peer);
                vec![ClientAction::Notify(Notification::PeerDisconnected { peer })]
            }
            ServerMessage::ReceiveGroupInvite { group_id, group_name, from } => {
                self.invites.insert(group_id.clone(), (group_name.clone(), from.clone()));
                vec![ClientAction::Notify(Notification::GroupInvited { group_id, group_name, from })]
            }
            ServerMessage::GroupCreated { group_id, group_name, owner, members, generation } => {
                self.handle_group_created(group_id, group_name, owner, members, generation)
            }
            ServerMessage::GroupCreationFailed { group_id, group_name: _, reason } => {
                self.invites.remove(&group_id);
                vec![ClientAction::Notify(Notification::GroupFailed { group_id, reason })]
            }
            ServerMessage::InviteRejected { group_id, user } => {
                vec![ClientAction::Notify(Notification::InviteDeclined { group_id, user })]
            }
            ServerMessage::GroupMembershipChanged {
                group_id,
                group_name,
                owner,
                members,
                generation,
            } => self.handle_membership_changed(group_id, group_name, owner, members, generation),
            ServerMessage::GroupTerminated { group_id } => {
                if self.groups.remove(&group_id).is_none() {
                    debug!(group = %group_id, "terminated notice for unknown group");
                    return Vec::new();
                }
                self.pending_rekeys.remove(&group_id);
                vec![
                    ClientAction::Send(ClientMessage::LeaveRoom { room_name: group_id.clone() }),
                    ClientAction::Notify(Notification::GroupDissolved { group_id }),
                ]
            }
            ServerMessage::ReceiveGroupKey { from, group_id, generation, key_payload } => {
                self.handle_group_key(from, group_id, generation, key_payload)
            }
        }
    }

    fn handle_public_key(&mut self, username: String, public_key: Option<Vec<u8>>) -> Vec<ClientAction> {
        self.pending_lookups.remove(&username);
        let Some(bytes) = public_key else {
            warn!(user = %username, "no public key registered");
            return Vec::new();
        };
        let key = match PublicKey::from_slice(&bytes) {
            Ok(key) => key,
            Err(error) => {
                warn!(user = %username, %error, "malformed public key, dropping");
                return Vec::new();
            }
        };
        self.directory.insert(username.clone(), key);

        let mut actions = self.complete_session_initiation(&username);
        for item in self.inbox.drain(&username) {
            actions.extend(self.apply_buffered(item));
        }
        for group_id in self.pending_rekeys.clone() {
            if self.rekey_ready(&group_id) {
                actions.extend(self.distribute_key(&group_id));
            }
        }
        actions
    }

    fn handle_chat_accepted(&mut self, from: String) -> Vec<ClientAction> {
        if !self.outgoing_requests.remove(&from) {
            debug!(peer = %from, "accept for a request we never sent");
            return Vec::new();
        }
        let room = room_name(&self.username, &from);
        self.sessions
            .insert(from.clone(), Session::new(from.clone(), room.clone(), Role::Initiator));
        self.rooms.insert(room.clone(), from.clone());
        let mut actions = vec![ClientAction::Send(ClientMessage::JoinRoom {
            room_name: room,
            username: self.username.clone(),
        })];
        if self.directory.contains_key(&from) {
            actions.extend(self.complete_session_initiation(&from));
        } else {
            actions.extend(self.lookup(&from));
        }
        actions
    }

    /// Initiator side of the handshake: once the responder's public key is
    /// known, generate the session key, install it, and send it sealed.
    fn complete_session_initiation(&mut self, peer: &str) -> Vec<ClientAction> {
        let Some(peer_key) = self.directory.get(peer).copied() else {
            return Vec::new();
        };
        let pending = self
            .sessions
            .get(peer)
            .is_some_and(|s| s.role == Role::Initiator && s.key.is_none());
        if !pending {
            return Vec::new();
        }
        let key = self.fresh_key();
        let nonce = self.fresh_nonce();
        let boxed = seal(key.as_bytes(), &nonce, &peer_key, &self.keypair.secret);
        let Some(session) = self.sessions.get_mut(peer) else {
            return Vec::new();
        };
        session.key = Some(key);
        let room = session.room.clone();
        vec![
            ClientAction::Send(ClientMessage::MessageToRoom {
                room_name: room,
                message: Envelope::SessionKey { boxed, nonce: nonce.to_vec() },
                from: self.username.clone(),
            }),
            ClientAction::Notify(Notification::SessionSecured { peer: peer.to_owned() }),
        ]
    }

    fn handle_envelope(&mut self, room: &str, envelope: Envelope, from: &str) -> Vec<ClientAction> {
        match envelope {
            Envelope::SessionKey { boxed, nonce } => {
                if self.directory.contains_key(from) {
                    self.apply_buffered(Buffered::SessionKey {
                        from: from.to_owned(),
                        boxed,
                        nonce,
                    })
                } else {
                    // Raced ahead of the directory lookup; park it.
                    self.inbox.push(
                        from,
                        Buffered::SessionKey { from: from.to_owned(), boxed, nonce },
                    );
                    self.lookup(from)
                }
            }
            Envelope::EncryptedMessage { ciphertext, nonce } => {
                self.open_traffic(room, &ciphertext, &nonce, from)
            }
            Envelope::GroupKey { .. } => {
                // Group keys travel point-to-point via `receive-group-key`,
                // never through a room.
                warn!(%room, %from, "group-key envelope in room traffic, dropping");
                Vec::new()
            }
        }
    }

    fn open_traffic(
        &mut self,
        room: &str,
        ciphertext: &[u8],
        nonce: &[u8],
        from: &str,
    ) -> Vec<ClientAction> {
        let Some(nonce) = nonce_array(nonce) else {
            warn!(%room, %from, "bad nonce length, dropping");
            return Vec::new();
        };

        // Group traffic travels in the room named after the group id.
        let key = if let Some(group) = self.groups.get(room) {
            group.key.as_ref().map(|(_, key)| key)
        } else if let Some(peer) = self.rooms.get(room) {
            self.sessions.get(peer).and_then(|s| s.key.as_ref())
        } else {
            warn!(%room, %from, "traffic for unknown room, dropping");
            return Vec::new();
        };
        let Some(key) = key else {
            warn!(%room, %from, "traffic before key establishment, dropping");
            return Vec::new();
        };

        let plaintext = match open_secret(ciphertext, &nonce, key) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                // A failed decrypt is dropped, never answered with a rekey:
                // reacting to unauthenticated input would let an outsider
                // drive key rotation.
                warn!(%room, %from, %error, "undecryptable message, dropping");
                return Vec::new();
            }
        };
        let Ok(text) = String::from_utf8(plaintext) else {
            warn!(%room, %from, "non-UTF-8 plaintext, dropping");
            return Vec::new();
        };

        if self.groups.contains_key(room) {
            vec![ClientAction::Notify(Notification::GroupMessage {
                group_id: room.to_owned(),
                from: from.to_owned(),
                text,
            })]
        } else {
            vec![ClientAction::Notify(Notification::ChatMessage { from: from.to_owned(), text })]
        }
    }

    fn handle_group_created(
        &mut self,
        group_id: String,
        group_name: String,
        owner: String,
        members: Vec<String>,
        generation: u64,
    ) -> Vec<ClientAction> {
        self.invites.remove(&group_id);
        let owned = owner == self.username;
        self.groups.insert(
            group_id.clone(),
            GroupSession {
                group_id: group_id.clone(),
                group_name: group_name.clone(),
                owner,
                members: members.clone(),
                generation,
                key: None,
            },
        );
        let mut actions = vec![
            ClientAction::Send(ClientMessage::JoinRoom {
                room_name: group_id.clone(),
                username: self.username.clone(),
            }),
            ClientAction::Notify(Notification::GroupFormed { group_id: group_id.clone(), group_name, members }),
        ];
        if owned {
            actions.extend(self.begin_rekey(&group_id));
        }
        actions
    }

    fn handle_membership_changed(
        &mut self,
        group_id: String,
        group_name: String,
        owner: String,
        members: Vec<String>,
        generation: u64,
    ) -> Vec<ClientAction> {
        if !members.contains(&self.username) {
            // We were removed.
            self.groups.remove(&group_id);
            self.pending_rekeys.remove(&group_id);
            return vec![
                ClientAction::Send(ClientMessage::LeaveRoom { room_name: group_id.clone() }),
                ClientAction::Notify(Notification::GroupChanged { group_id, members, generation }),
            ];
        }

        let mut actions = Vec::new();
        let owned = owner == self.username;
        match self.groups.get_mut(&group_id) {
            Some(group) => {
                group.group_name = group_name;
                group.owner = owner;
                group.members = members.clone();
                group.generation = generation;
            }
            None => {
                // Freshly added: bootstrap from the broadcast and subscribe
                // to the group room. The key arrives separately.
                self.groups.insert(
                    group_id.clone(),
                    GroupSession {
                        group_id: group_id.clone(),
                        group_name,
                        owner,
                        members: members.clone(),
                        generation,
                        key: None,
                    },
                );
                actions.push(ClientAction::Send(ClientMessage::JoinRoom {
                    room_name: group_id.clone(),
                    username: self.username.clone(),
                }));
            }
        }
        actions.push(ClientAction::Notify(Notification::GroupChanged {
            group_id: group_id.clone(),
            members,
            generation,
        }));
        if owned {
            actions.extend(self.begin_rekey(&group_id));
        }
        actions
    }

    fn handle_group_key(
        &mut self,
        from: String,
        group_id: String,
        generation: u64,
        key_payload: Envelope,
    ) -> Vec<ClientAction> {
        let Envelope::GroupKey { boxed, nonce } = key_payload else {
            warn!(group = %group_id, %from, "receive-group-key without a group-key envelope");
            return Vec::new();
        };
        let Some(group) = self.groups.get(&group_id) else {
            debug!(group = %group_id, %from, "key for unknown group, dropping");
            return Vec::new();
        };
        if group.owner != from {
            warn!(group = %group_id, %from, "group key from non-owner, dropping");
            return Vec::new();
        }
        let item = Buffered::GroupKey { from: from.clone(), group_id, generation, boxed, nonce };
        if self.directory.contains_key(&from) {
            self.apply_buffered(item)
        } else {
            self.inbox.push(&from, item);
            self.lookup(&from)
        }
    }

    /// Opens a parked (or just-arrived) key envelope now that the sealer's
    /// public key is cached.
    fn apply_buffered(&mut self, item: Buffered) -> Vec<ClientAction> {
        match item {
            Buffered::SessionKey { from, boxed, nonce } => {
                let already_secure = self
                    .sessions
                    .get(&from)
                    .is_none_or(|s| s.role != Role::Responder || s.key.is_some());
                if already_secure {
                    debug!(peer = %from, "redundant session key, dropping");
                    return Vec::new();
                }
                let Some(key) = self.open_key_box(&from, &boxed, &nonce) else {
                    return Vec::new();
                };
                if let Some(session) = self.sessions.get_mut(&from) {
                    session.key = Some(key);
                }
                vec![ClientAction::Notify(Notification::SessionSecured { peer: from })]
            }
            Buffered::GroupKey { from, group_id, generation, boxed, nonce } => {
                let Some(key) = self.open_key_box(&from, &boxed, &nonce) else {
                    return Vec::new();
                };
                let Some(group) = self.groups.get_mut(&group_id) else {
                    debug!(group = %group_id, "group vanished before its key arrived");
                    return Vec::new();
                };
                if !group.install_key(generation, key) {
                    debug!(group = %group_id, generation, "stale or duplicate group key, dropping");
                    return Vec::new();
                }
                vec![ClientAction::Notify(Notification::GroupSecured { group_id, generation })]
            }
        }
    }

    fn open_key_box(&self, from: &str, boxed: &[u8], nonce: &[u8]) -> Option<SymmetricKey> {
        let sender_key = self.directory.get(from)?;
        let nonce = nonce_array(nonce)?;
        let bytes = match open(boxed, &nonce, sender_key, &self.keypair.secret) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%from, %error, "sealed key failed to open, dropping");
                return None;
            }
        };
        match SymmetricKey::from_slice(&bytes) {
            Ok(key) => Some(key),
            Err(error) => {
                warn!(%from, %error, "sealed payload is not a key, dropping");
                None
            }
        }
    }

    // Owner-side rekey

    /// Starts a rekey of an owned group. If any member key is missing from
    /// the directory the rekey parks until the lookups complete.
    fn begin_rekey(&mut self, group_id: &str) -> Vec<ClientAction> {
        if self.rekey_ready(group_id) {
            return self.distribute_key(group_id);
        }
        self.pending_rekeys.insert(group_id.to_owned());
        let missing: Vec<String> = match self.groups.get(group_id) {
            Some(group) => group
                .members
                .iter()
                .filter(|m| **m != self.username && !self.directory.contains_key(*m))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };
        let mut actions = Vec::new();
        for member in missing {
            actions.extend(self.lookup(&member));
        }
        actions
    }

    /// Whether every co-member's public key is cached.
    fn rekey_ready(&self, group_id: &str) -> bool {
        self.groups.get(group_id).is_some_and(|group| {
            group.owned_by(&self.username)
                && group
                    .members
                    .iter()
                    .all(|m| *m == self.username || self.directory.contains_key(m))
        })
    }

    /// Generates a fresh group key for the current generation, seals it for
    /// each co-member, and installs it locally. All member keys must already
    /// be cached.
    fn distribute_key(&mut self, group_id: &str) -> Vec<ClientAction> {
        let (generation, recipients) = match self.groups.get(group_id) {
            Some(group) => {
                let recipients: Vec<(String, PublicKey)> = group
                    .members
                    .iter()
                    .filter(|m| **m != self.username)
                    .filter_map(|m| self.directory.get(m).map(|key| (m.clone(), *key)))
                    .collect();
                (group.generation, recipients)
            }
            None => return Vec::new(),
        };

        let key = self.fresh_key();
        let mut actions = Vec::new();
        for (member, member_key) in recipients {
            let nonce = self.fresh_nonce();
            let boxed = seal(key.as_bytes(), &nonce, &member_key, &self.keypair.secret);
            actions.push(ClientAction::Send(ClientMessage::DistributeGroupKey {
                to: member,
                group_id: group_id.to_owned(),
                generation,
                key_payload: Envelope::GroupKey { boxed, nonce: nonce.to_vec() },
            }));
        }
        if let Some(group) = self.groups.get_mut(group_id) {
            group.key = Some((generation, key));
        }
        self.pending_rekeys.remove(group_id);
        actions.push(ClientAction::Notify(Notification::GroupSecured {
            group_id: group_id.to_owned(),
            generation,
        }));
        actions
    }

    // Helpers

    fn lookup(&mut self, username: &str) -> Vec<ClientAction> {
        if !self.pending_lookups.insert(username.to_owned()) {
            return Vec::new();
        }
        vec![ClientAction::Send(ClientMessage::GetPublicKey { username: username.to_owned() })]
    }

    fn fresh_nonce(&mut self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        self.rng.fill_bytes(&mut nonce);
        nonce
    }

    fn fresh_key(&mut self) -> SymmetricKey {
        let mut bytes = [0u8; 32];
        self.rng.fill_bytes(&mut bytes);
        SymmetricKey::from_bytes(bytes)
    }
}

fn nonce_array(nonce: &[u8]) -> Option<[u8; NONCE_SIZE]> {
    nonce.try_into().ok()
}
