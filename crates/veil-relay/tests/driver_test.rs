//! Driver-level tests: feed events, assert on the returned actions.
//!
//! These cover the relay's protocol semantics without any I/O; the
//! end-to-end tests in `end_to_end.rs` add real client state machines on
//! both sides.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use veil_proto::{ClientMessage, Envelope, InviteResponse, ServerMessage};
use veil_relay::{EndpointId, RelayAction, RelayConfig, RelayDriver, RelayEvent};

fn driver() -> RelayDriver {
    RelayDriver::new(RelayConfig::default())
}

fn connect(driver: &mut RelayDriver, endpoint: EndpointId, username: &str) {
    driver.handle(RelayEvent::EndpointOpened { endpoint });
    driver.handle(RelayEvent::MessageReceived {
        endpoint,
        message: ClientMessage::Register { username: username.into() },
    });
}

fn message(driver: &mut RelayDriver, endpoint: EndpointId, message: ClientMessage) -> Vec<RelayAction> {
    driver.handle(RelayEvent::MessageReceived { endpoint, message })
}

/// Send actions only, as (target endpoint, message) pairs.
fn sends(actions: &[RelayAction]) -> Vec<(EndpointId, ServerMessage)> {
    actions
        .iter()
        .filter_map(|action| match action {
            RelayAction::Send { endpoint, message } => Some((*endpoint, message.clone())),
            _ => None,
        })
        .collect()
}

fn propose(
    driver: &mut RelayDriver,
    endpoint: EndpointId,
    group_id: &str,
    invitees: &[&str],
) -> Vec<RelayAction> {
    message(driver, endpoint, ClientMessage::ProposeGroup {
        group_id: group_id.into(),
        group_name: "Team".into(),
        invited_users: invitees.iter().map(|&s| s.to_owned()).collect(),
    })
}

fn respond(
    driver: &mut RelayDriver,
    endpoint: EndpointId,
    group_id: &str,
    response: InviteResponse,
) -> Vec<RelayAction> {
    message(driver, endpoint, ClientMessage::RespondGroupInvite {
        group_id: group_id.into(),
        user: String::new(),
        response,
    })
}

#[test]
fn register_broadcasts_sorted_roster_to_everyone() {
    let mut d = driver();
    connect(&mut d, 1, "zoe");
    d.handle(RelayEvent::EndpointOpened { endpoint: 2 });
    let actions = message(&mut d, 2, ClientMessage::Register { username: "alice".into() });

    let sends = sends(&actions);
    assert_eq!(sends.len(), 2);
    for (_, msg) in sends {
        assert_eq!(
            msg,
            ServerMessage::PresenceList { users: vec!["alice".into(), "zoe".into()] }
        );
    }
}

#[test]
fn requests_from_unbound_endpoints_are_dropped() {
    let mut d = driver();
    d.handle(RelayEvent::EndpointOpened { endpoint: 1 });
    let actions = message(&mut d, 1, ClientMessage::GetPublicKey { username: "alice".into() });
    assert!(sends(&actions).is_empty());
}

#[test]
fn first_public_key_registration_wins() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    message(&mut d, 1, ClientMessage::RegisterPublicKey { public_key: vec![1; 32] });
    message(&mut d, 1, ClientMessage::RegisterPublicKey { public_key: vec![2; 32] });

    let actions = message(&mut d, 2, ClientMessage::GetPublicKey { username: "alice".into() });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::PublicKeyResponse {
            username: "alice".into(),
            public_key: Some(vec![1; 32]),
        })]
    );
}

#[test]
fn unknown_key_lookup_answers_null() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    let actions = message(&mut d, 1, ClientMessage::GetPublicKey { username: "ghost".into() });
    assert_eq!(
        sends(&actions),
        vec![(1, ServerMessage::PublicKeyResponse { username: "ghost".into(), public_key: None })]
    );
}

#[test]
fn chat_request_reaches_every_endpoint_of_the_target() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "bob");

    let actions = message(&mut d, 1, ClientMessage::SendChatRequest { to: "bob".into() });
    let mut targets: Vec<EndpointId> = sends(&actions).into_iter().map(|(e, _)| e).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec![2, 3]);
}

#[test]
fn room_traffic_excludes_the_sender() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    message(&mut d, 1, ClientMessage::JoinRoom { room_name: "alice--bob".into(), username: "alice".into() });
    message(&mut d, 2, ClientMessage::JoinRoom { room_name: "alice--bob".into(), username: "bob".into() });

    let envelope = Envelope::EncryptedMessage { ciphertext: vec![7; 32], nonce: vec![0; 24] };
    let actions = message(&mut d, 1, ClientMessage::MessageToRoom {
        room_name: "alice--bob".into(),
        message: envelope.clone(),
        from: "alice".into(),
    });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::ReceiveMessage {
            room_name: "alice--bob".into(),
            message: envelope,
            from: "alice".into(),
        })]
    );
}

#[test]
fn leaving_a_room_notifies_the_peers_left_behind() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    message(&mut d, 1, ClientMessage::JoinRoom { room_name: "r".into(), username: "alice".into() });
    message(&mut d, 2, ClientMessage::JoinRoom { room_name: "r".into(), username: "bob".into() });

    let actions = message(&mut d, 1, ClientMessage::LeaveRoom { room_name: "r".into() });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::PartnerDisconnected { room_name: "r".into() })]
    );
}

#[test]
fn all_invitees_accepting_forms_the_full_group() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");

    let actions = propose(&mut d, 1, "g1", &["bob", "carol"]);
    let invites = sends(&actions);
    assert_eq!(invites.len(), 2);
    for (_, msg) in &invites {
        assert!(matches!(msg, ServerMessage::ReceiveGroupInvite { group_id, from, .. }
            if group_id == "g1" && from == "alice"));
    }

    let actions = respond(&mut d, 2, "g1", InviteResponse::Accept);
    assert!(sends(&actions).is_empty(), "no resolution until the last answer");

    let actions = respond(&mut d, 3, "g1", InviteResponse::Accept);
    let created = sends(&actions);
    assert_eq!(created.len(), 3);
    for (_, msg) in created {
        assert_eq!(msg, ServerMessage::GroupCreated {
            group_id: "g1".into(),
            group_name: "Team".into(),
            owner: "alice".into(),
            members: vec!["alice".into(), "bob".into(), "carol".into()],
            generation: 1,
        });
    }
}

#[test]
fn one_decline_shrinks_the_group_to_the_accepters() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);

    let actions = respond(&mut d, 3, "g1", InviteResponse::Decline);
    let sends = sends(&actions);
    // The proposer learns who declined, then the two accepted identities
    // still form the group. The decliner is not a member and hears nothing.
    assert!(sends.iter().any(|(e, m)| *e == 1
        && matches!(m, ServerMessage::InviteRejected { group_id, user }
            if group_id == "g1" && user == "carol")));
    let mut created: Vec<EndpointId> = sends
        .iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupCreated { members, generation, .. }
            if *members == vec!["alice".to_owned(), "bob".to_owned()] && *generation == 1))
        .map(|(e, _)| *e)
        .collect();
    created.sort_unstable();
    assert_eq!(created, vec![1, 2]);
    assert!(!sends.iter().any(|(e, _)| *e == 3));
    assert_eq!(d.status().active_groups, 1);
}

#[test]
fn sole_decline_fails_the_two_party_proposal() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    propose(&mut d, 1, "g1", &["bob"]);

    let actions = respond(&mut d, 2, "g1", InviteResponse::Decline);
    let sends = sends(&actions);
    assert!(sends.iter().any(|(e, m)| *e == 1
        && matches!(m, ServerMessage::InviteRejected { user, .. } if user == "bob")));
    let failed: Vec<EndpointId> = sends
        .iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupCreationFailed { reason, .. }
            if reason.contains("bob")))
        .map(|(e, _)| *e)
        .collect();
    assert!(failed.contains(&1) && failed.contains(&2));
    assert_eq!(d.status().active_groups, 0);
}

#[test]
fn duplicate_and_foreign_declines_never_reach_the_proposer() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    connect(&mut d, 4, "mallory");
    propose(&mut d, 1, "g1", &["bob", "carol"]);

    // An online identity that was never invited cannot put a decline on
    // record, and the proposer hears nothing about it.
    let actions = respond(&mut d, 4, "g1", InviteResponse::Decline);
    assert!(sends(&actions).is_empty());

    // A recorded decline reaches the proposer once...
    let actions = respond(&mut d, 2, "g1", InviteResponse::Decline);
    assert!(sends(&actions).iter().any(|(e, m)| *e == 1
        && matches!(m, ServerMessage::InviteRejected { user, .. } if user == "bob")));

    // ...and repeating it is a pure no-op.
    let actions = respond(&mut d, 2, "g1", InviteResponse::Decline);
    assert!(sends(&actions).is_empty());
    assert_eq!(d.status().pending_groups, 1, "still waiting on carol");
}

#[test]
fn proposal_with_offline_invitee_fails_immediately() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");

    let actions = propose(&mut d, 1, "g1", &["bob", "ghost"]);
    let sends = sends(&actions);
    assert_eq!(sends.len(), 1);
    let (endpoint, msg) = &sends[0];
    assert_eq!(*endpoint, 1);
    assert!(matches!(msg, ServerMessage::GroupCreationFailed { reason, .. }
        if reason.contains("ghost")));
    // Bob was never contacted.
    assert!(d.status().pending_groups == 0);
}

#[test]
fn reused_group_id_is_dropped() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    propose(&mut d, 1, "g1", &["bob"]);

    let actions = propose(&mut d, 2, "g1", &["alice"]);
    assert!(sends(&actions).is_empty());
    assert_eq!(d.status().pending_groups, 1);
}

#[test]
fn duplicate_invite_responses_are_idempotent() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);

    respond(&mut d, 2, "g1", InviteResponse::Accept);
    let actions = respond(&mut d, 2, "g1", InviteResponse::Accept);
    assert!(sends(&actions).is_empty());
    assert_eq!(d.status().pending_groups, 1, "still waiting on carol");
}

#[test]
fn participant_disconnect_cancels_pending_proposals() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);

    let actions = d.handle(RelayEvent::EndpointClosed { endpoint: 3 });
    let failures: Vec<EndpointId> = sends(&actions)
        .into_iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupCreationFailed { reason, .. }
            if reason.contains("disconnected")))
        .map(|(e, _)| e)
        .collect();
    assert!(failures.contains(&1) && failures.contains(&2));
    assert_eq!(d.status().pending_groups, 0);
}

#[test]
fn group_key_distribution_is_owner_fenced() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    propose(&mut d, 1, "g1", &["bob"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);

    let payload = Envelope::GroupKey { boxed: vec![1; 48], nonce: vec![0; 24] };

    // A member who is not the owner cannot distribute.
    let actions = message(&mut d, 2, ClientMessage::DistributeGroupKey {
        to: "alice".into(),
        group_id: "g1".into(),
        generation: 1,
        key_payload: payload.clone(),
    });
    assert!(sends(&actions).is_empty());

    // The owner cannot target a non-member.
    let actions = message(&mut d, 1, ClientMessage::DistributeGroupKey {
        to: "mallory".into(),
        group_id: "g1".into(),
        generation: 1,
        key_payload: payload.clone(),
    });
    assert!(sends(&actions).is_empty());

    // Owner to member passes through unchanged.
    let actions = message(&mut d, 1, ClientMessage::DistributeGroupKey {
        to: "bob".into(),
        group_id: "g1".into(),
        generation: 1,
        key_payload: payload.clone(),
    });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::ReceiveGroupKey {
            from: "alice".into(),
            group_id: "g1".into(),
            generation: 1,
            key_payload: payload,
        })]
    );
}

#[test]
fn admin_remove_bumps_generation_and_tells_the_removed_member() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);
    respond(&mut d, 3, "g1", InviteResponse::Accept);

    let actions = message(&mut d, 1, ClientMessage::AdminRemoveMember {
        group_id: "g1".into(),
        member_name: "carol".into(),
    });
    let sends = sends(&actions);
    assert_eq!(sends.len(), 3, "remaining members plus the removed one");
    for (_, msg) in sends {
        assert_eq!(msg, ServerMessage::GroupMembershipChanged {
            group_id: "g1".into(),
            group_name: "Team".into(),
            owner: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
            generation: 2,
        });
    }
}

#[test]
fn non_owner_admin_mutations_are_ignored() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);

    let actions = message(&mut d, 2, ClientMessage::AdminAddMember {
        group_id: "g1".into(),
        member_name: "carol".into(),
    });
    assert!(sends(&actions).is_empty());
}

#[test]
fn owner_disconnect_terminates_owned_groups() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);
    respond(&mut d, 3, "g1", InviteResponse::Accept);

    let actions = d.handle(RelayEvent::EndpointClosed { endpoint: 1 });
    let terminated: Vec<EndpointId> = sends(&actions)
        .into_iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupTerminated { group_id } if group_id == "g1"))
        .map(|(e, _)| e)
        .collect();
    assert!(terminated.contains(&2) && terminated.contains(&3));
    assert_eq!(d.status().active_groups, 0);
}

#[test]
fn member_disconnect_shrinks_the_group_with_a_generation_bump() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "carol");
    propose(&mut d, 1, "g1", &["bob", "carol"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);
    respond(&mut d, 3, "g1", InviteResponse::Accept);

    let actions = d.handle(RelayEvent::EndpointClosed { endpoint: 3 });
    let changed: Vec<(EndpointId, ServerMessage)> = sends(&actions)
        .into_iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupMembershipChanged { .. }))
        .collect();
    assert_eq!(changed.len(), 2);
    for (_, msg) in changed {
        assert_eq!(msg, ServerMessage::GroupMembershipChanged {
            group_id: "g1".into(),
            group_name: "Team".into(),
            owner: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
            generation: 2,
        });
    }
    assert_eq!(d.status().active_groups, 1, "the group persists without carol");
}

#[test]
fn owner_leave_is_ignored_while_another_owner_endpoint_lives() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    connect(&mut d, 3, "alice");
    propose(&mut d, 1, "g1", &["bob"]);
    respond(&mut d, 2, "g1", InviteResponse::Accept);

    let actions = message(&mut d, 1, ClientMessage::OwnerLeave { group_id: "g1".into() });
    assert!(sends(&actions).is_empty());
    assert_eq!(d.status().active_groups, 1);

    // With the other endpoint gone the leave is honored.
    d.handle(RelayEvent::EndpointClosed { endpoint: 3 });
    let actions = message(&mut d, 1, ClientMessage::OwnerLeave { group_id: "g1".into() });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::GroupTerminated { group_id: "g1".into() })]
    );
}

#[test]
fn disconnect_purges_the_public_key() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    message(&mut d, 1, ClientMessage::RegisterPublicKey { public_key: vec![1; 32] });
    d.handle(RelayEvent::EndpointClosed { endpoint: 1 });

    let actions = message(&mut d, 2, ClientMessage::GetPublicKey { username: "alice".into() });
    assert_eq!(
        sends(&actions),
        vec![(2, ServerMessage::PublicKeyResponse { username: "alice".into(), public_key: None })]
    );
}

#[test]
fn multi_endpoint_identity_survives_a_single_disconnect() {
    let mut d = driver();
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "alice");
    connect(&mut d, 3, "bob");
    message(&mut d, 1, ClientMessage::RegisterPublicKey { public_key: vec![1; 32] });

    d.handle(RelayEvent::EndpointClosed { endpoint: 1 });
    assert_eq!(d.status().identities, 2);
    let actions = message(&mut d, 3, ClientMessage::GetPublicKey { username: "alice".into() });
    assert_eq!(
        sends(&actions),
        vec![(3, ServerMessage::PublicKeyResponse {
            username: "alice".into(),
            public_key: Some(vec![1; 32]),
        })]
    );
}

#[test]
fn endpoint_limit_closes_excess_connections() {
    let mut d = RelayDriver::new(RelayConfig { max_endpoints: 1, ..RelayConfig::default() });
    connect(&mut d, 1, "alice");
    let actions = d.handle(RelayEvent::EndpointOpened { endpoint: 2 });
    assert!(actions.iter().any(|a| matches!(a, RelayAction::Close { endpoint: 2, .. })));
}

#[test]
fn stale_proposals_expire_on_tick() {
    let mut d = RelayDriver::new(RelayConfig {
        pending_group_expiry: Some(Duration::from_secs(5)),
        ..RelayConfig::default()
    });
    connect(&mut d, 1, "alice");
    connect(&mut d, 2, "bob");
    d.handle(RelayEvent::Tick { now_ms: 1_000 });
    propose(&mut d, 1, "g1", &["bob"]);

    let actions = d.handle(RelayEvent::Tick { now_ms: 3_000 });
    assert!(sends(&actions).is_empty(), "not yet expired");

    let actions = d.handle(RelayEvent::Tick { now_ms: 7_000 });
    let failures: Vec<EndpointId> = sends(&actions)
        .into_iter()
        .filter(|(_, m)| matches!(m, ServerMessage::GroupCreationFailed { reason, .. }
            if reason.contains("expired")))
        .map(|(e, _)| e)
        .collect();
    // Failure notices go to the responders and the proposer; an invitee
    // that never answered is left alone.
    assert_eq!(failures, vec![1]);
    assert_eq!(d.status().pending_groups, 0);
}
