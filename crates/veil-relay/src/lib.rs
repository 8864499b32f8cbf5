//! Veil relay.
//!
//! Untrusted rendezvous point for end-to-end encrypted chat. The relay
//! tracks presence, stores public keys, brokers group formation, and
//! forwards sealed envelopes; it never holds key material that could
//! decrypt traffic.
//!
//! # Architecture
//!
//! All protocol logic lives in [`RelayDriver`], a sans-IO state machine:
//! it consumes [`RelayEvent`]s and returns [`RelayAction`]s, touching no
//! sockets or clocks. [`Relay`] is the production shell that feeds it from
//! a TCP listener speaking newline-delimited JSON and executes its actions
//! on a Tokio runtime. Every event is processed to completion by a single
//! task, so the registries need no locking.
//!
//! # Components
//!
//! - [`PresenceRegistry`] / [`PublicKeyDirectory`]: who is online, and
//!   their published keys (first registration wins)
//! - [`RoomRegistry`]: room subscriptions for envelope forwarding
//! - [`PendingGroupNegotiator`]: group proposals resolving once every
//!   invitee answered, formed from whoever accepted
//! - [`ActiveGroupRegistry`]: formed groups with generation-fenced
//!   membership mutations

#![forbid(unsafe_code)]

mod driver;
mod error;
mod groups;
mod pending;
mod registry;
mod rooms;
mod shell;

pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent, RelayStatus};
pub use error::RelayError;
pub use groups::{ActiveGroup, ActiveGroupRegistry, MembershipChange};
pub use pending::{
    InviteStatus, PendingGroup, PendingGroupNegotiator, ProposeOutcome, Resolution, RespondOutcome,
};
pub use registry::{
    BindOutcome, CloseOutcome, EndpointId, PresenceRegistry, PublicKeyDirectory,
};
pub use rooms::RoomRegistry;
pub use shell::{Relay, RelayRuntimeConfig};
