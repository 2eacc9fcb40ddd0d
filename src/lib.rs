//! A RakNet-compatible reliable UDP transport core: connectionless
//! datagrams over a single UDP socket with a mix of reliability,
//! ordering, sequencing, fragmentation, and ACK/NACK-driven
//! retransmission (see `SPEC_FULL.md`).
//!
//! The crate is organized leaves-first, matching the dependency order a
//! datagram travels through on receive:
//!
//! - [`codec`] — pure wire-primitive encode/decode, no I/O.
//! - [`wire`] — the offline handshake/discovery message set.
//! - [`reliability`] — the eight reliability variants and channel type.
//! - [`window`] — inbound dedup/ordering/sequencing/reassembly plus
//!   outbound retransmission bookkeeping.
//! - [`peer`] — the per-peer reliability engine and handshake state
//!   machine, as a bevy [`Component`](bevy::ecs::component::Component).
//! - [`endpoint`] — the socket/peer-map/tick-loop layer and its bevy
//!   systems.
//! - [`sink`] — an optional channel-backed bridge out of the bevy
//!   schedule for hosts that want callback execution on its own thread.
//! - [`events`] — the application-visible event types every layer above
//!   produces.
//! - [`config`] — runtime-tunable options (`RakNetConfig`).
//! - [`error`] — the `RakNetError` kind enum.

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod peer;
pub mod reliability;
pub mod sink;
pub mod window;
pub mod wire;

pub use config::RakNetConfig;
pub use error::{RakNetError, Recipient, Result};
pub use reliability::{Channel, Reliability};
