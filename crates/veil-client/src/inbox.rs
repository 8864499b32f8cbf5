use std::collections::HashMap;

/// A sealed key envelope that arrived before the sender's public key.
///
/// Opening a box needs the sender's public key; when an envelope races
/// ahead of the directory lookup it is parked here instead of being
/// dropped, keyed by the identity whose key is awaited.
#[derive(Debug, Clone)]
pub enum Buffered {
    /// A `session-key` envelope awaiting the initiator's public key.
    SessionKey {
        /// Sealing identity.
        from: String,
        /// Sealed session key.
        boxed: Vec<u8>,
        /// Seal nonce.
        nonce: Vec<u8>,
    },
    /// A `group-key` envelope awaiting the owner's public key.
    GroupKey {
        /// Sealing owner.
        from: String,
        /// Group the key belongs to.
        group_id: String,
        /// Generation the key covers.
        generation: u64,
        /// Sealed group key.
        boxed: Vec<u8>,
        /// Seal nonce.
        nonce: Vec<u8>,
    },
}

/// Holding area for out-of-order key envelopes.
///
/// Envelopes are drained in arrival order once the awaited public key
/// lands; the drain consumes them, so each is processed at most once.
#[derive(Debug, Default)]
pub struct Inbox {
    waiting: HashMap<String, Vec<Buffered>>,
}

impl Inbox {
    /// Parks an envelope until `awaiting`'s public key is known.
    pub fn push(&mut self, awaiting: &str, item: Buffered) {
        self.waiting.entry(awaiting.to_owned()).or_default().push(item);
    }

    /// Removes and returns everything waiting on `awaiting`, in arrival
    /// order.
    pub fn drain(&mut self, awaiting: &str) -> Vec<Buffered> {
        self.waiting.remove(awaiting).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_arrival_order_and_consumes() {
        let mut inbox = Inbox::default();
        inbox.push(
            "alice",
            Buffered::SessionKey { from: "alice".into(), boxed: vec![1], nonce: vec![0; 24] },
        );
        inbox.push(
            "alice",
            Buffered::SessionKey { from: "alice".into(), boxed: vec![2], nonce: vec![0; 24] },
        );

        let drained = inbox.drain("alice");
        assert_eq!(drained.len(), 2);
        let Buffered::SessionKey { boxed, .. } = &drained[0] else {
            panic!("expected session key");
        };
        assert_eq!(boxed, &vec![1]);

        assert!(inbox.drain("alice").is_empty());
    }

    #[test]
    fn drain_unknown_identity_is_empty() {
        let mut inbox = Inbox::default();
        assert!(inbox.drain("nobody").is_empty());
    }
}
