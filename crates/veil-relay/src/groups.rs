//! Active group registry and the membership-mutation protocol.
//!
//! Every mutation increments the group's key generation; consumers must treat
//! the prior group key as revoked whenever the generation increases. Mutations
//! are fenced here (owner-only operations, owner may not remove itself,
//! non-members cannot leave); a rejected mutation is a silent no-op for the
//! driver. A group may shrink to the owner alone and persists until owner
//! loss, which terminates it.

use std::collections::{BTreeSet, HashMap};

/// A formed group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGroup {
    /// Unique group id (also the group's room name).
    pub group_id: String,
    /// Human-readable name.
    pub group_name: String,
    /// Owning identity; the only one allowed to mutate membership.
    pub owner: String,
    /// Current member set, owner included.
    pub members: BTreeSet<String>,
    /// Key generation. Strictly increases with every membership mutation.
    pub generation: u64,
}

impl ActiveGroup {
    /// Sorted member list for wire messages.
    pub fn member_list(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }
}

/// A successfully applied membership mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// Affected group.
    pub group_id: String,
    /// Group name.
    pub group_name: String,
    /// Owning identity.
    pub owner: String,
    /// Member set after the mutation, sorted.
    pub members: Vec<String>,
    /// Generation after the mutation.
    pub generation: u64,
    /// The identity added to or removed from the group.
    pub affected: String,
}

/// Registry of all formed groups.
#[derive(Debug, Default)]
pub struct ActiveGroupRegistry {
    groups: HashMap<String, ActiveGroup>,
}

impl ActiveGroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a group with this id exists.
    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Look up a group.
    pub fn get(&self, group_id: &str) -> Option<&ActiveGroup> {
        self.groups.get(group_id)
    }

    /// Number of active groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no groups exist.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Create a group from a formed proposal. Requires at least two members
    /// including the owner and an unused id; returns the new group on
    /// success.
    pub fn form(
        &mut self,
        group_id: &str,
        group_name: &str,
        owner: &str,
        members: BTreeSet<String>,
    ) -> Option<&ActiveGroup> {
        if self.groups.contains_key(group_id)
            || members.len() < 2
            || !members.contains(owner)
        {
            return None;
        }
        let group = ActiveGroup {
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            owner: owner.to_owned(),
            members,
            generation: 1,
        };
        self.groups.insert(group_id.to_owned(), group);
        self.groups.get(group_id)
    }

    /// Owner adds a member. Fenced: caller must be the owner, the target must
    /// not already be a member.
    pub fn add_member(
        &mut self,
        group_id: &str,
        caller: &str,
        new_member: &str,
    ) -> Option<MembershipChange> {
        let group = self.groups.get_mut(group_id)?;
        if group.owner != caller || group.members.contains(new_member) {
            return None;
        }
        group.members.insert(new_member.to_owned());
        group.generation += 1;
        Some(change_of(group, new_member))
    }

    /// Owner removes a member. Fenced: caller must be the owner and may not
    /// target itself; the target must be a member.
    pub fn remove_member(
        &mut self,
        group_id: &str,
        caller: &str,
        member: &str,
    ) -> Option<MembershipChange> {
        let group = self.groups.get_mut(group_id)?;
        if group.owner != caller || member == caller || !group.members.contains(member) {
            return None;
        }
        group.members.remove(member);
        group.generation += 1;
        Some(change_of(group, member))
    }

    /// A non-owner member removes itself.
    pub fn self_leave(&mut self, group_id: &str, caller: &str) -> Option<MembershipChange> {
        let group = self.groups.get_mut(group_id)?;
        if group.owner == caller || !group.members.contains(caller) {
            return None;
        }
        group.members.remove(caller);
        group.generation += 1;
        Some(change_of(group, caller))
    }

    /// Remove a fully offline identity from every group it belongs to as a
    /// non-owner member. One change per affected group.
    pub fn implicit_leave(&mut self, identity: &str) -> Vec<MembershipChange> {
        let mut changes = Vec::new();
        for group in self.groups.values_mut() {
            if group.owner != identity && group.members.remove(identity) {
                group.generation += 1;
                changes.push(change_of(group, identity));
            }
        }
        changes
    }

    /// Terminate a group on owner loss. Fenced: the group must exist and the
    /// caller must be its current owner. Returns the removed group.
    pub fn terminate(&mut self, group_id: &str, caller: &str) -> Option<ActiveGroup> {
        if self.groups.get(group_id).is_none_or(|group| group.owner != caller) {
            return None;
        }
        self.groups.remove(group_id)
    }

    /// Ids of every group owned by an identity.
    pub fn owned_by(&self, identity: &str) -> Vec<String> {
        self.groups
            .values()
            .filter(|group| group.owner == identity)
            .map(|group| group.group_id.clone())
            .collect()
    }
}

fn change_of(group: &ActiveGroup, affected: &str) -> MembershipChange {
    MembershipChange {
        group_id: group.group_id.clone(),
        group_name: group.group_name.clone(),
        owner: group.owner.clone(),
        members: group.member_list(),
        generation: group.generation,
        affected: affected.to_owned(),
    }
}
