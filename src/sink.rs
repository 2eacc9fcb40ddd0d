//! A channel-backed event sink bridging the tick loop's typed bevy
//! [`Event`](bevy::ecs::event::Event) stream out to a dedicated
//! application context (spec §5: "a slow handler never blocks the tick
//! loop" + §9 redesign flag "a single *event sink* capability ... passed
//! in at endpoint construction; variant-over-event-kind dispatch; no
//! runtime name lookup").
//!
//! Bevy's own `EventReader`/`EventWriter` already give variant-typed,
//! no-reflection dispatch inside the schedule, but every reader still
//! runs on the same scheduler as the tick. A host that wants callback
//! execution to never share a stack frame with socket I/O drains an
//! [`EventReceiver`] on its own thread instead; [`bridge_events`] is the
//! one system that empties every typed reader into it each tick, so
//! ordering between events for the same peer matches the order they were
//! produced in (spec §5 "ordering between callbacks for the same peer
//! must preserve the wire order").

use bevy::ecs::event::EventReader;
use bevy::ecs::system::{Res, Resource};

use crate::events::{
    HandlePing, OnAcknowledge, OnConnect, OnDisconnect, OnHandlerError, OnLatency, OnLogin,
    OnMessage, OnNotAcknowledge, OnPeerError,
};

/// One application-visible occurrence, flattened out of whichever typed
/// bevy event produced it. `RakNetError` does not implement `Clone`
/// (it wraps `std::io::Error`), so [`OnPeerError`]'s cause is rendered to
/// a string at the bridge boundary — the receiving context only needs to
/// log or report it, never to match on the original error value.
#[derive(Debug, Clone)]
pub enum RakNetEvent {
    Connect(OnConnect),
    Login(OnLogin),
    Disconnect(OnDisconnect),
    Message(OnMessage),
    Acknowledge(OnAcknowledge),
    NotAcknowledge(OnNotAcknowledge),
    Latency(OnLatency),
    HandlerError { address: std::net::SocketAddr, cause: String },
    PeerError { peer: bevy::ecs::entity::Entity, cause: String },
    Ping(HandlePing),
}

/// Cloneable handle the tick loop's [`bridge_events`] system sends
/// through; a host keeps the paired [`EventReceiver`] on whatever thread
/// it wants callbacks to run on.
#[derive(Resource, Clone)]
pub struct EventSink {
    sender: kanal::Sender<RakNetEvent>,
}

/// The consuming half, handed to the host application at endpoint
/// construction. Not a bevy resource: it is meant to be moved onto a
/// thread the bevy schedule never touches.
pub struct EventReceiver {
    receiver: kanal::Receiver<RakNetEvent>,
}

/// Creates a bounded sink/receiver pair. A bound (rather than unbounded)
/// channel means a host that never drains its receiver applies backpressure
/// to the bridge system instead of growing memory without limit; the tick
/// loop's own retransmission/ACK work is unaffected since `bridge_events`
/// only forwards, it never blocks on peer state.
pub fn channel(capacity: usize) -> (EventSink, EventReceiver) {
    let (sender, receiver) = kanal::bounded(capacity.max(1));
    (EventSink { sender }, EventReceiver { receiver })
}

impl EventReceiver {
    /// Blocks until the next event is available.
    pub fn recv(&self) -> Option<RakNetEvent> {
        self.receiver.recv().ok()
    }

    /// Returns the next event if one is already queued, without blocking.
    pub fn try_recv(&self) -> Option<RakNetEvent> {
        self.receiver.try_recv().ok().flatten()
    }
}

/// Drains every typed event reader this tick and forwards each occurrence
/// into the sink, in the order the readers are polled. Only registered
/// when a host supplies an [`EventSink`] resource; otherwise events stay
/// on the bevy event buses for in-schedule consumers.
#[allow(clippy::too_many_arguments)]
pub fn bridge_events(
    sink: Option<Res<EventSink>>,
    mut on_connect: EventReader<OnConnect>,
    mut on_login: EventReader<OnLogin>,
    mut on_disconnect: EventReader<OnDisconnect>,
    mut on_message: EventReader<OnMessage>,
    mut on_ack: EventReader<OnAcknowledge>,
    mut on_nack: EventReader<OnNotAcknowledge>,
    mut on_latency: EventReader<OnLatency>,
    mut on_handler_error: EventReader<OnHandlerError>,
    mut on_peer_error: EventReader<OnPeerError>,
    mut on_ping: EventReader<HandlePing>,
) {
    let Some(sink) = sink else {
        return;
    };

    for e in on_connect.read() {
        let _ = sink.sender.try_send(RakNetEvent::Connect(*e));
    }
    for e in on_login.read() {
        let _ = sink.sender.try_send(RakNetEvent::Login(*e));
    }
    for e in on_disconnect.read() {
        let _ = sink.sender.try_send(RakNetEvent::Disconnect(*e));
    }
    for e in on_message.read() {
        let _ = sink.sender.try_send(RakNetEvent::Message(e.clone()));
    }
    for e in on_ack.read() {
        let _ = sink.sender.try_send(RakNetEvent::Acknowledge(*e));
    }
    for e in on_nack.read() {
        let _ = sink.sender.try_send(RakNetEvent::NotAcknowledge(*e));
    }
    for e in on_latency.read() {
        let _ = sink.sender.try_send(RakNetEvent::Latency(*e));
    }
    for e in on_handler_error.read() {
        let _ = sink.sender.try_send(RakNetEvent::HandlerError {
            address: e.address,
            cause: e.cause.clone(),
        });
    }
    for e in on_peer_error.read() {
        let _ = sink.sender.try_send(RakNetEvent::PeerError {
            peer: e.peer,
            cause: e.cause.to_string(),
        });
    }
    for e in on_ping.read() {
        let _ = sink.sender.try_send(RakNetEvent::Ping(e.clone()));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn channel_delivers_in_fifo_order() {
        let (sink, rx) = channel(8);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        sink.sender
            .send(RakNetEvent::HandlerError {
                address: addr,
                cause: "first".into(),
            })
            .unwrap();
        sink.sender
            .send(RakNetEvent::HandlerError {
                address: addr,
                cause: "second".into(),
            })
            .unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();

        assert!(matches!(first, RakNetEvent::HandlerError { cause, .. } if cause == "first"));
        assert!(matches!(second, RakNetEvent::HandlerError { cause, .. } if cause == "second"));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn bounded_backpressure_drops_when_full_without_blocking() {
        let (sink, rx) = channel(1);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        sink.sender
            .send(RakNetEvent::HandlerError {
                address: addr,
                cause: "a".into(),
            })
            .unwrap();

        // try_send on a full bounded channel returns `Ok(false)` rather
        // than blocking or erroring, so the only way to tell the send was
        // dropped is to check what the receiver actually sees afterward.
        let sent = sink
            .sender
            .try_send(RakNetEvent::HandlerError {
                address: addr,
                cause: "b".into(),
            })
            .unwrap();
        assert!(!sent);

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, RakNetEvent::HandlerError { cause, .. } if cause == "a"));
        assert!(rx.try_recv().is_none());
    }
}
