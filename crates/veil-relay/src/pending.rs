//! Group-formation consensus.
//!
//! A proposed group collects accept/decline answers from every invitee. The
//! proposer counts as accepted from the start. Once all invitees have
//! answered, the proposal resolves exactly once: `Formed` when at least two
//! identities (proposer included) accepted, `Failed` otherwise. Any
//! participant going fully offline before resolution fails the proposal
//! immediately. A resolved group id is never resurrected here.

use std::collections::{BTreeSet, HashMap};

/// An invitee's consensus state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    /// Not yet answered.
    Pending,
    /// Accepted the invite.
    Accepted,
    /// Declined the invite.
    Declined,
}

/// A group proposal awaiting consensus.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    /// Caller-chosen group id.
    pub group_id: String,
    /// Human-readable name.
    pub group_name: String,
    /// Proposing identity (implicitly accepted; becomes owner on formation).
    pub proposer: String,
    /// Driver clock at proposal time, for the optional expiry policy.
    pub proposed_at_ms: u64,
    status: HashMap<String, InviteStatus>,
}

impl PendingGroup {
    /// Everyone involved: proposer plus all invitees.
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.proposer.as_str()).chain(self.status.keys().map(String::as_str))
    }

    /// Whether the identity is the proposer or an invitee.
    pub fn involves(&self, identity: &str) -> bool {
        self.proposer == identity || self.status.contains_key(identity)
    }

    /// Invitees that have answered, plus the proposer. These are the
    /// identities notified when the proposal fails.
    pub fn contacted(&self) -> BTreeSet<String> {
        let mut contacted: BTreeSet<String> = self
            .status
            .iter()
            .filter(|(_, status)| **status != InviteStatus::Pending)
            .map(|(who, _)| who.clone())
            .collect();
        contacted.insert(self.proposer.clone());
        contacted
    }

    /// Terminal outcome if every invitee has answered.
    fn resolution(&self) -> Option<Resolution> {
        if self.status.values().any(|status| *status == InviteStatus::Pending) {
            return None;
        }

        let mut members: BTreeSet<String> = self
            .status
            .iter()
            .filter(|(_, status)| **status == InviteStatus::Accepted)
            .map(|(who, _)| who.clone())
            .collect();
        members.insert(self.proposer.clone());

        if members.len() >= 2 {
            return Some(Resolution::Formed { members });
        }

        let decliners: Vec<&str> = self
            .status
            .iter()
            .filter(|(_, status)| **status == InviteStatus::Declined)
            .map(|(who, _)| who.as_str())
            .collect();
        let reason = if decliners.is_empty() {
            "not enough members accepted".to_owned()
        } else {
            let mut sorted = decliners;
            sorted.sort_unstable();
            format!("not enough members accepted: declined by {}", sorted.join(", "))
        };
        Some(Resolution::Failed { reason })
    }
}

/// A proposal's terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Consensus reached with at least two accepted identities.
    Formed {
        /// Accepted identities, proposer included.
        members: BTreeSet<String>,
    },
    /// Consensus failed; the group will never exist.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

/// Outcome of submitting a proposal.
#[derive(Debug)]
pub enum ProposeOutcome {
    /// The id is already taken by another pending proposal.
    AlreadyExists,
    /// Invites are outstanding.
    AwaitingResponses,
    /// The proposal resolved immediately (no invitees to wait for).
    Resolved(PendingGroup, Resolution),
}

/// Outcome of an invitee's answer.
#[derive(Debug)]
pub enum RespondOutcome {
    /// Unknown group, non-invitee, or duplicate answer. Idempotent no-op.
    Ignored,
    /// Recorded; other invitees are still pending.
    Recorded,
    /// The answer completed consensus. The proposal is removed.
    Resolved(PendingGroup, Resolution),
}

/// Tracks every unresolved group proposal.
#[derive(Debug, Default)]
pub struct PendingGroupNegotiator {
    pending: HashMap<String, PendingGroup>,
}

impl PendingGroupNegotiator {
    /// Create an empty negotiator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a proposal with this id is outstanding.
    pub fn contains(&self, group_id: &str) -> bool {
        self.pending.contains_key(group_id)
    }

    /// Proposer of an outstanding proposal.
    pub fn proposer_of(&self, group_id: &str) -> Option<&str> {
        self.pending.get(group_id).map(|group| group.proposer.as_str())
    }

    /// Number of outstanding proposals.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no proposals are outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit a proposal. Self-invites are dropped from the invitee list; an
    /// empty effective list resolves immediately (insufficient consensus).
    pub fn propose(
        &mut self,
        group_id: &str,
        group_name: &str,
        proposer: &str,
        invitees: &[String],
        now_ms: u64,
    ) -> ProposeOutcome {
        if self.pending.contains_key(group_id) {
            return ProposeOutcome::AlreadyExists;
        }

        let status: HashMap<String, InviteStatus> = invitees
            .iter()
            .filter(|invitee| invitee.as_str() != proposer)
            .map(|invitee| (invitee.clone(), InviteStatus::Pending))
            .collect();

        let group = PendingGroup {
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            proposer: proposer.to_owned(),
            proposed_at_ms: now_ms,
            status,
        };

        if let Some(resolution) = group.resolution() {
            return ProposeOutcome::Resolved(group, resolution);
        }
        self.pending.insert(group_id.to_owned(), group);
        ProposeOutcome::AwaitingResponses
    }

    /// Record an invitee's answer. Duplicate answers (responder no longer
    /// pending) are ignored.
    pub fn respond(&mut self, group_id: &str, responder: &str, accepted: bool) -> RespondOutcome {
        let Some(group) = self.pending.get_mut(group_id) else {
            return RespondOutcome::Ignored;
        };
        match group.status.get_mut(responder) {
            Some(status @ InviteStatus::Pending) => {
                *status =
                    if accepted { InviteStatus::Accepted } else { InviteStatus::Declined };
            }
            Some(_) | None => return RespondOutcome::Ignored,
        }

        match group.resolution() {
            Some(resolution) => {
                let Some(group) = self.pending.remove(group_id) else {
                    return RespondOutcome::Ignored;
                };
                RespondOutcome::Resolved(group, resolution)
            }
            None => RespondOutcome::Recorded,
        }
    }

    /// Fail and remove every proposal a disconnecting identity participates
    /// in (cascading cancellation).
    pub fn cancel_for(&mut self, identity: &str) -> Vec<PendingGroup> {
        let cancelled: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, group)| group.involves(identity))
            .map(|(id, _)| id.clone())
            .collect();
        cancelled.into_iter().filter_map(|id| self.pending.remove(&id)).collect()
    }

    /// Remove every proposal older than the cutoff (expiry policy knob).
    pub fn expire_before(&mut self, cutoff_ms: u64) -> Vec<PendingGroup> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, group)| group.proposed_at_ms < cutoff_ms)
            .map(|(id, _)| id.clone())
            .collect();
        expired.into_iter().filter_map(|id| self.pending.remove(&id)).collect()
    }
}
