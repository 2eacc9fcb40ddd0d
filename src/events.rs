//! Application-visible event sink (spec §9 "a single event sink capability
//! ... variant-over-event-kind dispatch; no runtime name lookup").
//!
//! Generalized from the teacher's `RakNetEvent`/`NetworkEvent` pair, which
//! mixed debug-only variants (`IncomingBatch`/`OutgoingBatch`) with
//! lifecycle ones. This crate exposes exactly the application interface
//! named in spec §6, each as its own bevy `Event` so a host only has to
//! register `EventReader`s for the ones it cares about.

use std::net::SocketAddr;
use std::time::Duration;

use bevy::ecs::entity::Entity;
use bevy::ecs::event::Event;
use bytes::Bytes;

use crate::error::RakNetError;
use crate::reliability::Channel;
use crate::window::ReceiptId;

/// Why a peer left the peer map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent `DisconnectionNotification`.
    Notified,
    /// An application call to `disconnect`.
    Requested,
    /// No inbound datagram for longer than the configured timeout.
    Timeout,
    /// The peer's packet rate exceeded `max_packets_per_second`.
    Flood,
}

/// Fires once the offline handshake's second round completes and the peer
/// is placed in the peer map (spec §4.5, state CONNECTED).
#[derive(Event, Debug, Clone, Copy)]
pub struct OnConnect {
    pub peer: Entity,
    pub address: SocketAddr,
}

/// Fires on receipt of `NewIncomingConnection` (spec §4.5, state LOGGED_IN).
#[derive(Event, Debug, Clone, Copy)]
pub struct OnLogin {
    pub peer: Entity,
    pub address: SocketAddr,
}

/// Fires once a peer's state machine enters DISCONNECTED, right before its
/// peer-map entry is removed.
#[derive(Event, Debug, Clone, Copy)]
pub struct OnDisconnect {
    pub peer: Entity,
    pub address: SocketAddr,
    pub reason: DisconnectReason,
}

/// A user payload delivered by the reliability engine, already
/// deduplicated/reordered/reassembled per its reliability (spec §4.4
/// inbound path).
#[derive(Event, Debug, Clone)]
pub struct OnMessage {
    pub peer: Entity,
    pub channel: Channel,
    pub payload: Bytes,
}

/// The covering ACK for a `*_WITH_ACK_RECEIPT` send has been processed
/// (spec §4.4 "ACK/NACK emission").
#[derive(Event, Debug, Clone, Copy)]
pub struct OnAcknowledge {
    pub peer: Entity,
    pub receipt: ReceiptId,
}

/// The covering NACK for an `UNRELIABLE_WITH_ACK_RECEIPT` send has been
/// processed; unlike reliable variants this is never followed by a
/// retransmission.
#[derive(Event, Debug, Clone, Copy)]
pub struct OnNotAcknowledge {
    pub peer: Entity,
    pub receipt: ReceiptId,
}

/// An application callback raised an error; caught at the boundary so it
/// never re-enters the protocol loop (spec §7).
#[derive(Event, Debug)]
pub struct OnHandlerError {
    pub address: SocketAddr,
    pub cause: String,
}

/// A per-peer runtime error (malformed datagram, protocol violation after
/// the handshake, etc). Disconnects only that peer.
#[derive(Event, Debug)]
pub struct OnPeerError {
    pub peer: Entity,
    pub cause: RakNetError,
}

/// An `UnconnectedPing`/`UnconnectedPingOpenConnections` arrived; the host
/// may inspect `sender` and is given the configured identifier bytes that
/// will be echoed back in the `UnconnectedPong` unless it overrides them.
#[derive(Event, Debug, Clone)]
pub struct HandlePing {
    pub sender: SocketAddr,
    pub identifier: Vec<u8>,
}

/// Latency measurement surfaced whenever an ACK resolves at least one
/// outstanding reliable frame (teacher's `RakNetEvent::Latency`, kept —
/// not named in spec §6's event list but a natural companion the wider
/// RakNet ecosystem always exposes and spec.md's non-goals don't exclude).
#[derive(Event, Debug, Clone, Copy)]
pub struct OnLatency {
    pub peer: Entity,
    pub rtt: Duration,
}
