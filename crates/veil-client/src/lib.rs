//! Client-side state machine for the Veil protocol.
//!
//! The core type is [`Client`]: a pure state machine that consumes
//! [`ClientEvent`]s (wire messages from the relay plus local user intents)
//! and produces [`ClientAction`]s (wire messages to send plus notifications
//! for the embedding UI). It performs no I/O of its own; the embedding
//! runtime feeds it events and executes its actions.
//!
//! All cryptography lives in [`veil_crypto`]. The client holds the local
//! identity keypair, negotiates pairwise session keys over the relay, and
//! manages per-group symmetric keys with generation fencing: a message is
//! never encrypted under a key older than the group's current membership
//! generation.

#![forbid(unsafe_code)]

mod client;
mod error;
mod event;
mod group;
mod inbox;
mod session;

pub use client::Client;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, Notification};
pub use group::GroupSession;
pub use session::{Role, Session};
