//! Presence registry and public-key directory.
//!
//! The presence registry maintains bidirectional mappings: identity → set of
//! live endpoints (for delivery and the "online" truth) and endpoint → bound
//! identity (for request attribution). An identity exists exactly as long as
//! its endpoint set is non-empty.
//!
//! The key directory holds at most one public key per online identity. First
//! registration wins; the record is purged when the identity goes fully
//! offline.

use std::collections::{HashMap, HashSet};

/// A live connection handle, assigned by the runtime shell.
pub type EndpointId = u64;

/// Result of binding an endpoint to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The identity came online with this endpoint (presence changed).
    CameOnline,
    /// The identity was already online; this is an additional endpoint.
    AdditionalEndpoint,
    /// No-op: the endpoint was already bound (to this or another identity),
    /// or is unknown.
    Ignored,
}

/// Result of closing an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    /// Identity the endpoint was bound to, if any.
    pub identity: Option<String>,
    /// True when this was the identity's last endpoint (presence changed).
    pub went_offline: bool,
}

/// Identity ↔ endpoint tracking; the source of "online" truth.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// Endpoint → bound identity (`None` until `register`).
    endpoints: HashMap<EndpointId, Option<String>>,
    /// Identity → live endpoints.
    identities: HashMap<String, HashSet<EndpointId>>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened, not yet bound endpoint.
    pub fn open(&mut self, endpoint: EndpointId) {
        self.endpoints.entry(endpoint).or_insert(None);
    }

    /// Bind an endpoint to an identity. Idempotent per endpoint: a second
    /// bind attempt (same or different identity) is ignored.
    pub fn bind(&mut self, endpoint: EndpointId, identity: &str) -> BindOutcome {
        match self.endpoints.get_mut(&endpoint) {
            Some(slot @ None) => {
                *slot = Some(identity.to_owned());
                let endpoints = self.identities.entry(identity.to_owned()).or_default();
                endpoints.insert(endpoint);
                if endpoints.len() == 1 {
                    BindOutcome::CameOnline
                } else {
                    BindOutcome::AdditionalEndpoint
                }
            }
            Some(Some(_)) | None => BindOutcome::Ignored,
        }
    }

    /// Remove an endpoint entirely.
    pub fn close(&mut self, endpoint: EndpointId) -> CloseOutcome {
        let Some(bound) = self.endpoints.remove(&endpoint) else {
            return CloseOutcome { identity: None, went_offline: false };
        };
        let Some(identity) = bound else {
            return CloseOutcome { identity: None, went_offline: false };
        };

        let mut went_offline = false;
        if let Some(endpoints) = self.identities.get_mut(&identity) {
            endpoints.remove(&endpoint);
            if endpoints.is_empty() {
                self.identities.remove(&identity);
                went_offline = true;
            }
        }
        CloseOutcome { identity: Some(identity), went_offline }
    }

    /// Identity bound to an endpoint, if any.
    pub fn identity_of(&self, endpoint: EndpointId) -> Option<&str> {
        self.endpoints.get(&endpoint).and_then(|bound| bound.as_deref())
    }

    /// Live endpoints of an identity. Empty when offline.
    pub fn endpoints_of(&self, identity: &str) -> impl Iterator<Item = EndpointId> + '_ {
        self.identities.get(identity).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Whether the identity has at least one live endpoint.
    pub fn is_online(&self, identity: &str) -> bool {
        self.identities.contains_key(identity)
    }

    /// All open endpoints, bound or not.
    pub fn all_endpoints(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.endpoints.keys().copied()
    }

    /// Sorted roster of online identities.
    pub fn online_identities(&self) -> Vec<String> {
        let mut roster: Vec<String> = self.identities.keys().cloned().collect();
        roster.sort();
        roster
    }

    /// Number of open endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of online identities.
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }
}

/// Identity → registered public key. First write wins.
#[derive(Debug, Default)]
pub struct PublicKeyDirectory {
    keys: HashMap<String, Vec<u8>>,
}

impl PublicKeyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key for an identity. Returns `false` (silent no-op) when a
    /// record already exists.
    pub fn register(&mut self, identity: &str, key: Vec<u8>) -> bool {
        if self.keys.contains_key(identity) {
            return false;
        }
        self.keys.insert(identity.to_owned(), key);
        true
    }

    /// Look up an identity's key. `None` for unknown identities.
    pub fn lookup(&self, identity: &str) -> Option<&[u8]> {
        self.keys.get(identity).map(Vec::as_slice)
    }

    /// Drop an identity's record (called when it goes fully offline).
    pub fn purge(&mut self, identity: &str) {
        self.keys.remove(identity);
    }
}
