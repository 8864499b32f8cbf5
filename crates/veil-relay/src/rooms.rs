//! Room subscription tracking.
//!
//! Bidirectional mappings: room → subscribed endpoints (for relay) and
//! endpoint → rooms (for cleanup on disconnect). Rooms are created lazily on
//! first join and removed when their last subscriber leaves.

use std::collections::{HashMap, HashSet};

use crate::registry::EndpointId;

/// Room name → endpoints and the reverse index.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, HashSet<EndpointId>>,
    endpoint_rooms: HashMap<EndpointId, HashSet<String>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an endpoint to a room. Idempotent; returns `true` on a new
    /// subscription.
    pub fn join(&mut self, endpoint: EndpointId, room: &str) -> bool {
        let inserted = self.rooms.entry(room.to_owned()).or_default().insert(endpoint);
        if inserted {
            self.endpoint_rooms.entry(endpoint).or_default().insert(room.to_owned());
        }
        inserted
    }

    /// Unsubscribe an endpoint from a room. Returns `true` when it was
    /// subscribed.
    pub fn leave(&mut self, endpoint: EndpointId, room: &str) -> bool {
        let removed = self.rooms.get_mut(room).is_some_and(|set| set.remove(&endpoint));
        if self.rooms.get(room).is_some_and(HashSet::is_empty) {
            self.rooms.remove(room);
        }
        if let Some(rooms) = self.endpoint_rooms.get_mut(&endpoint) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.endpoint_rooms.remove(&endpoint);
            }
        }
        removed
    }

    /// Endpoints subscribed to a room.
    pub fn members(&self, room: &str) -> impl Iterator<Item = EndpointId> + '_ {
        self.rooms.get(room).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Remove an endpoint from every room it was in, returning those rooms.
    pub fn drop_endpoint(&mut self, endpoint: EndpointId) -> Vec<String> {
        let rooms: Vec<String> =
            self.endpoint_rooms.remove(&endpoint).into_iter().flatten().collect();
        for room in &rooms {
            if let Some(set) = self.rooms.get_mut(room) {
                set.remove(&endpoint);
                if set.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        rooms
    }
}
