use veil_crypto::SymmetricKey;

/// Client-side view of one active group.
///
/// The `generation` field tracks the relay's membership generation; `key`
/// pairs the installed symmetric key with the generation it was distributed
/// for. The group is writable only when the two line up: a key minted for
/// an older membership must never encrypt fresh traffic.
#[derive(Debug)]
pub struct GroupSession {
    /// Relay-unique identifier.
    pub group_id: String,
    /// Human-readable name.
    pub group_name: String,
    /// Owning identity.
    pub owner: String,
    /// Current membership, owner included.
    pub members: Vec<String>,
    /// Current membership generation per the relay.
    pub generation: u64,
    /// Installed group key and the generation it covers.
    pub key: Option<(u64, SymmetricKey)>,
}

impl GroupSession {
    /// Whether this client owns the group.
    pub fn owned_by(&self, username: &str) -> bool {
        self.owner == username
    }

    /// Whether the installed key covers the current generation.
    ///
    /// Fail-closed: no key, or a key minted for an older generation,
    /// renders the group unwritable until the next distribution lands.
    pub fn secure(&self) -> bool {
        self.key
            .as_ref()
            .is_some_and(|(covered, _)| *covered >= self.generation)
    }

    /// Installs a distributed key, refusing stale generations.
    ///
    /// Returns whether the key was accepted. A key for a generation at or
    /// above the current one is installed (above can happen when the
    /// membership-change broadcast is still in flight); anything older is
    /// dropped.
    pub fn install_key(&mut self, generation: u64, key: SymmetricKey) -> bool {
        if generation < self.generation {
            return false;
        }
        match &self.key {
            Some((covered, _)) if *covered >= generation => false,
            _ => {
                self.key = Some((generation, key));
                true
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn group(generation: u64) -> GroupSession {
        GroupSession {
            group_id: "g1".into(),
            group_name: "ops".into(),
            owner: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
            generation,
            key: None,
        }
    }

    #[test]
    fn keyless_group_is_insecure() {
        assert!(!group(1).secure());
    }

    #[test]
    fn matching_generation_is_secure() {
        let mut g = group(2);
        assert!(g.install_key(2, SymmetricKey::from_bytes([7; 32])));
        assert!(g.secure());
    }

    #[test]
    fn stale_key_is_rejected_and_insecure() {
        let mut g = group(3);
        assert!(!g.install_key(2, SymmetricKey::from_bytes([7; 32])));
        assert!(!g.secure());
    }

    #[test]
    fn generation_bump_revokes_security() {
        let mut g = group(1);
        g.install_key(1, SymmetricKey::from_bytes([7; 32]));
        g.generation = 2;
        assert!(!g.secure());
    }

    #[test]
    fn ahead_of_time_key_is_kept() {
        let mut g = group(1);
        assert!(g.install_key(2, SymmetricKey::from_bytes([7; 32])));
        g.generation = 2;
        assert!(g.secure());
    }
}
