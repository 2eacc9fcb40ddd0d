//! The per-peer reliability engine and handshake state machine (spec §3
//! "Peer", §4.2 Datagram Framer, §4.3 Encapsulation Layer, §4.4
//! Reliability Engine, §4.5 Peer State Machine).
//!
//! Unified from the teacher's two parallel generations of the same idea
//! (`net::stream::RakStream` and `net::conn::RakStream`) — this keeps the
//! newer one's shape (one component owning the socket handle, encode/
//! decode methods, a window per concern) and fills in the pieces the
//! teacher's version referenced but never defined (`RecoveryWindow`) or
//! got wrong (`SplitWindow`'s out-of-order panic, see [`crate::window`]).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use std::{collections::HashMap, net::UdpSocket};

use bevy::ecs::component::Component;
use bevy::ecs::entity::Entity;
use byteorder::{ReadBytesExt, BE, LE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::trace;

use crate::codec;
use crate::error::RakNetError;
use crate::events::DisconnectReason;
use crate::reliability::{Channel, Reliability, MAX_CHANNELS};
use crate::wire;
use crate::window::{
    DatagramWindow, OrderedChannel, ReceiptId, RecoveryWindow, ReliableWindow, SequencedChannel,
    SplitAssembly,
};

const UDP_HEADER_SIZE: usize = 28;
const DATAGRAM_HEADER_SIZE: usize = 1 + 3;
const FRAME_HEADER_SIZE: usize = 1 + 2;
const FRAME_SPLIT_SIZE: usize = 4 + 2 + 4;

pub(crate) const FLAG_DATAGRAM: u8 = 0x80;
pub(crate) const FLAG_ACK: u8 = 0x40;
pub(crate) const FLAG_NACK: u8 = 0x20;
pub(crate) const FLAG_FRAGMENTED: u8 = 0x10;
pub(crate) const FLAG_NEEDS_B_AND_AS: u8 = 0x04;

/// Any payload whose first byte is below this is a reserved internal
/// protocol message this layer interprets itself (`ConnectionRequest`,
/// `ConnectedPing`, ...); anything at or above it is opaque application
/// data handed straight to `on_message`. Spec §1 excludes
/// application-layer message typing from the core, but the core still has
/// to tell its own handshake/keep-alive traffic apart from a user's first
/// payload byte — this is RakNet's real `ID_USER_PACKET_ENUM` cutoff.
pub const USER_PACKET_ENUM: u8 = 0x86;

fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A peer's position in the handshake/liveness state machine (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connected,
    Handshaking,
    LoggedIn,
    Disconnected,
}

/// Effects produced by decoding inbound datagrams, translated into bevy
/// events by the endpoint systems. Kept free of bevy types so the
/// reliability engine itself is plain, synchronously testable Rust.
#[derive(Debug)]
pub enum PeerOutput {
    Message { channel: Channel, payload: Bytes },
    LoggedIn,
    Acknowledge(ReceiptId),
    NotAcknowledge(ReceiptId),
    Latency(Duration),
    Disconnect(DisconnectReason),
}

struct PendingFrame {
    bytes: Bytes,
    reliable_index: Option<u32>,
    receipt: Option<ReceiptId>,
    unreliable_receipt: bool,
}

/// The per-peer component: handshake state, outbound counters, the
/// inbound dedup/ordering/sequencing/reassembly windows, and the
/// outstanding-reliable recovery bookkeeping (spec §3 "Peer").
#[derive(Component)]
pub struct Peer {
    pub address: SocketAddr,
    pub guid: u64,
    pub mtu: usize,
    pub state: PeerState,

    /// The entity carrying this peer's `RakSocket`/`Mappings`, for server
    /// peers that need to prune the endpoint's address/guid maps on
    /// disconnect. `None` for a client's own peer, which owns its socket
    /// directly.
    pub owner: Option<Entity>,

    socket: Arc<UdpSocket>,

    sequence_number: u32,
    reliable_index: u32,
    sequence_index: Vec<u32>,
    order_index: Vec<u32>,
    split_id: u16,
    next_receipt_id: u64,

    datagram_window: DatagramWindow,
    reliable_window: ReliableWindow,
    ordered_channels: Vec<OrderedChannel>,
    sequenced_channels: Vec<SequencedChannel>,
    split_assemblies: HashMap<u16, SplitAssembly>,
    recovery: RecoveryWindow,

    outbound_buffer: BytesMut,
    pending_in_buffer: Vec<PendingFrame>,

    last_receive: Instant,
    last_keepalive_sent: Instant,
    packets_this_second: u32,
    packet_window_start: Instant,
}

impl Peer {
    pub fn new(
        address: SocketAddr,
        guid: u64,
        socket: Arc<UdpSocket>,
        mtu: usize,
        owner: Option<Entity>,
    ) -> Self {
        let now = Instant::now();
        Self {
            address,
            guid,
            mtu,
            state: PeerState::Connected,
            owner,
            socket,
            sequence_number: 0,
            reliable_index: 0,
            sequence_index: vec![0; MAX_CHANNELS as usize],
            order_index: vec![0; MAX_CHANNELS as usize],
            split_id: 0,
            next_receipt_id: 0,
            datagram_window: DatagramWindow::new(),
            reliable_window: ReliableWindow::new(),
            ordered_channels: (0..MAX_CHANNELS).map(|_| OrderedChannel::new()).collect(),
            sequenced_channels: (0..MAX_CHANNELS).map(|_| SequencedChannel::new()).collect(),
            split_assemblies: HashMap::new(),
            recovery: RecoveryWindow::new(),
            outbound_buffer: BytesMut::new(),
            pending_in_buffer: Vec::new(),
            last_receive: now,
            last_keepalive_sent: now,
            packets_this_second: 0,
            packet_window_start: now,
        }
    }

    fn max_datagram_payload(&self) -> usize {
        self.mtu
            .saturating_sub(UDP_HEADER_SIZE + DATAGRAM_HEADER_SIZE)
    }

    // ---- outbound -------------------------------------------------

    /// Submits an application (or internal protocol) payload for sending
    /// (spec §4.4 outbound path). Returns a receipt handle iff the
    /// reliability requests one.
    pub fn send_message(
        &mut self,
        reliability: Reliability,
        channel: Channel,
        payload: &[u8],
    ) -> Option<ReceiptId> {
        let receipt = if reliability.wants_ack_receipt() {
            let id = ReceiptId(self.next_receipt_id);
            self.next_receipt_id += 1;
            Some(id)
        } else {
            None
        };

        let fragments = split_payload(payload, reliability, self.mtu);
        let split = fragments.len() > 1;
        let split_id = self.split_id;
        if split {
            self.split_id = self.split_id.wrapping_add(1);
        }

        // Sequence/order indices name the whole logical message, not the
        // fragment — every fragment of a split message carries the same
        // one (spec §4.4: "each fragment inherits the parent's
        // reliability; reliable fragments get *distinct* reliable
        // indices" — reliable index is the only thing that varies).
        let sequence_index = if reliability.is_sequenced() {
            let idx = self.sequence_index[channel.0 as usize];
            self.sequence_index[channel.0 as usize] += 1;
            Some(idx)
        } else {
            None
        };

        let order_index = if reliability.has_ordering_channel() {
            let idx = self.order_index[channel.0 as usize];
            self.order_index[channel.0 as usize] += 1;
            Some(idx)
        } else {
            None
        };

        let wants_unreliable_receipt = matches!(reliability, Reliability::UnreliableWithAckReceipt);
        let last = fragments.len().saturating_sub(1);

        for (index, chunk) in fragments.iter().enumerate() {
            let reliable_index = if reliability.is_reliable() {
                let idx = self.reliable_index;
                self.reliable_index += 1;
                Some(idx)
            } else {
                None
            };

            let split_header = split.then_some((split_id, fragments.len() as u32, index as u32));

            let mut frame = BytesMut::new();
            encode_frame(
                &mut frame,
                reliability,
                reliable_index,
                sequence_index,
                order_index,
                channel,
                split_header,
                chunk,
            );

            // An ack-receipt is surfaced at most once per logical message
            // (spec §5); for a split message we tie it to the last
            // fragment rather than double-counting every fragment.
            let frame_receipt = if index == last { receipt } else { None };

            self.queue_frame(
                frame.freeze(),
                reliable_index,
                frame_receipt,
                wants_unreliable_receipt && index == last,
            );
        }

        receipt
    }

    fn send_internal(&mut self, reliability: Reliability, message: &wire::Message) {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        self.send_message(reliability, Channel(0), &buf);
    }

    /// Kicks off the connected-datagram half of the handshake from the
    /// client side (spec §4.5: "Client role is the symmetric dual").
    pub fn initiate_handshake(&mut self, client_guid: u64) {
        let request_timestamp = unix_timestamp_millis();
        self.send_internal(
            Reliability::Unreliable,
            &wire::Message::ConnectionRequest {
                client_guid,
                request_timestamp,
            },
        );
    }

    fn queue_frame(
        &mut self,
        frame: Bytes,
        reliable_index: Option<u32>,
        receipt: Option<ReceiptId>,
        unreliable_receipt: bool,
    ) {
        let max = self.max_datagram_payload();
        if !self.outbound_buffer.is_empty() && self.outbound_buffer.len() + frame.len() > max {
            self.flush_batch();
        }

        self.outbound_buffer.put_slice(&frame);
        self.pending_in_buffer.push(PendingFrame {
            bytes: frame,
            reliable_index,
            receipt,
            unreliable_receipt,
        });
    }

    fn requeue(&mut self, reliable_index: u32, bytes: Bytes, receipt: Option<ReceiptId>) {
        let max = self.max_datagram_payload();
        if !self.outbound_buffer.is_empty() && self.outbound_buffer.len() + bytes.len() > max {
            self.flush_batch();
        }

        self.outbound_buffer.put_slice(&bytes);
        self.pending_in_buffer.push(PendingFrame {
            bytes,
            reliable_index: Some(reliable_index),
            receipt,
            unreliable_receipt: false,
        });
    }

    /// Flushes any batched frames into a single connected datagram (spec
    /// §4.4 outbound step 3). Called every tick and whenever a pending
    /// frame would overflow the current datagram.
    pub fn flush_batch(&mut self) {
        if self.outbound_buffer.is_empty() {
            return;
        }

        let seq = self.sequence_number;
        self.sequence_number = self.sequence_number.wrapping_add(1);

        let mut datagram = BytesMut::with_capacity(DATAGRAM_HEADER_SIZE + self.outbound_buffer.len());
        datagram.put_u8(FLAG_DATAGRAM | FLAG_NEEDS_B_AND_AS);
        codec::write_u24::<LE>(&mut datagram, seq);
        datagram.put_slice(&self.outbound_buffer);

        if let Err(e) = self.socket.send_to(&datagram, self.address) {
            trace!("send_to {} failed: {e}", self.address);
        }

        for pending in self.pending_in_buffer.drain(..) {
            if let Some(index) = pending.reliable_index {
                self.recovery
                    .record_reliable(index, seq, pending.bytes, pending.receipt);
            } else if pending.unreliable_receipt {
                if let Some(receipt) = pending.receipt {
                    self.recovery.record_unreliable_receipt(seq, receipt);
                }
            }
        }

        self.outbound_buffer.clear();
    }

    /// Re-packs any reliable frame unacknowledged for longer than
    /// `timeout` into a fresh datagram (spec §4.4 outbound step 4).
    pub fn retransmit_expired(&mut self, timeout: Duration) {
        for (index, bytes, receipt) in self.recovery.expired(timeout) {
            self.requeue(index, bytes, receipt);
        }
    }

    /// Emits ACK/NACK datagrams for whatever this peer has accumulated
    /// since the last flush (spec §4.4 "ACK/NACK emission").
    pub fn flush_receipts(&mut self) {
        let acks = self.datagram_window.take_acks();
        if !acks.is_empty() {
            let mut buf = BytesMut::new();
            buf.put_u8(FLAG_DATAGRAM | FLAG_ACK);
            write_records(&mut buf, &acks);
            let _ = self.socket.send_to(&buf, self.address);
        }

        let nacks = self.datagram_window.take_nacks();
        if !nacks.is_empty() {
            let mut buf = BytesMut::new();
            buf.put_u8(FLAG_DATAGRAM | FLAG_NACK);
            write_records(&mut buf, &nacks);
            let _ = self.socket.send_to(&buf, self.address);
        }
    }

    /// Sends a keep-alive `ConnectedPing` if the connection has been idle
    /// for at least `interval` (spec §4.5 liveness).
    pub fn keepalive_if_idle(&mut self, interval: Duration) {
        if self.last_keepalive_sent.elapsed() < interval {
            return;
        }

        self.last_keepalive_sent = Instant::now();
        self.send_internal(
            Reliability::Unreliable,
            &wire::Message::ConnectedPing {
                client_timestamp: unix_timestamp_millis(),
            },
        );
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive.elapsed() >= timeout
    }

    /// Records one more inbound datagram for this second's flood counter.
    /// Returns `true` once `max_per_second` has been exceeded.
    pub fn register_packet(&mut self, max_per_second: u32) -> bool {
        if self.packet_window_start.elapsed() >= Duration::from_secs(1) {
            self.packet_window_start = Instant::now();
            self.packets_this_second = 0;
        }

        self.packets_this_second += 1;
        self.packets_this_second > max_per_second
    }

    /// Graceful disconnection (spec §4.5): send the notification
    /// synchronously and flush immediately.
    pub fn disconnect(&mut self) {
        self.send_internal(Reliability::Unreliable, &wire::Message::DisconnectionNotification);
        self.flush_batch();
        self.state = PeerState::Disconnected;
    }

    // ---- inbound ----------------------------------------------------

    /// Decodes one inbound datagram: a data datagram, an ACK, or a NACK
    /// (spec §4.2).
    pub fn decode(&mut self, buffer: &[u8]) -> Result<Vec<PeerOutput>, RakNetError> {
        self.last_receive = Instant::now();

        let mut reader = std::io::Cursor::new(buffer);
        let header = reader
            .read_u8()
            .map_err(|_| RakNetError::MalformedField("empty datagram"))?;

        if header & FLAG_DATAGRAM == 0 {
            return Err(RakNetError::ProtocolViolation(
                "datagram missing FLAG_DATAGRAM",
            ));
        }

        if header & FLAG_ACK != 0 {
            return self.decode_ack(&mut reader);
        }

        if header & FLAG_NACK != 0 {
            return self.decode_nack(&mut reader);
        }

        self.decode_datagram(&mut reader)
    }

    fn decode_ack(&mut self, reader: &mut std::io::Cursor<&[u8]>) -> Result<Vec<PeerOutput>, RakNetError> {
        let mut outputs = Vec::new();

        for seq in read_records(reader)? {
            for receipt in self.recovery.acknowledge(seq) {
                outputs.push(PeerOutput::Acknowledge(receipt));
            }
        }

        outputs.push(PeerOutput::Latency(self.recovery.rtt()));
        Ok(outputs)
    }

    fn decode_nack(&mut self, reader: &mut std::io::Cursor<&[u8]>) -> Result<Vec<PeerOutput>, RakNetError> {
        let mut outputs = Vec::new();

        for seq in read_records(reader)? {
            let (frames, not_acked) = self.recovery.nack(seq);

            for (index, bytes, receipt) in frames {
                self.requeue(index, bytes, receipt);
            }

            for receipt in not_acked {
                outputs.push(PeerOutput::NotAcknowledge(receipt));
            }
        }

        Ok(outputs)
    }

    fn decode_datagram(&mut self, reader: &mut std::io::Cursor<&[u8]>) -> Result<Vec<PeerOutput>, RakNetError> {
        let seq = codec::read_u24::<LE>(reader)?;

        if !self.datagram_window.receive(seq) {
            return Ok(Vec::new());
        }

        let mut outputs = Vec::new();

        while reader.remaining() != 0 {
            let frame = decode_frame(reader)?;

            if let Some(index) = frame.reliable_index {
                if !self.reliable_window.accept(index) {
                    continue;
                }
            }

            let payload: Bytes = if let Some((split_id, split_count, split_index)) = frame.split {
                let assembly = self
                    .split_assemblies
                    .entry(split_id)
                    .or_insert_with(|| SplitAssembly::new(split_count));

                if assembly.total() != split_count {
                    return Err(RakNetError::ProtocolViolation(
                        "split count mismatch for split id",
                    ));
                }

                match assembly.receive(split_index, Bytes::copy_from_slice(frame.payload)) {
                    Some(whole) => {
                        self.split_assemblies.remove(&split_id);
                        whole
                    }
                    None => continue,
                }
            } else {
                Bytes::copy_from_slice(frame.payload)
            };

            if frame.reliability.is_sequenced() {
                let sequence_index = frame.sequence_index.unwrap_or(0);
                if !self.sequenced_channels[frame.channel.0 as usize].accept(sequence_index) {
                    continue;
                }
                self.deliver(frame.channel, payload, &mut outputs);
            } else if frame.reliability.is_ordered() {
                let order_index = frame.order_index.unwrap_or(0);
                for ready in self.ordered_channels[frame.channel.0 as usize].receive(order_index, payload) {
                    self.deliver(frame.channel, ready, &mut outputs);
                }
            } else {
                self.deliver(frame.channel, payload, &mut outputs);
            }
        }

        Ok(outputs)
    }

    fn deliver(&mut self, channel: Channel, payload: Bytes, outputs: &mut Vec<PeerOutput>) {
        let first_byte = payload.first().copied();

        match first_byte {
            Some(id) if id < USER_PACKET_ENUM => match wire::Message::decode(&payload) {
                Ok(message) => self.handle_internal(message, outputs),
                Err(_) => outputs.push(PeerOutput::Message { channel, payload }),
            },
            _ => outputs.push(PeerOutput::Message { channel, payload }),
        }
    }

    fn handle_internal(&mut self, message: wire::Message, outputs: &mut Vec<PeerOutput>) {
        match message {
            wire::Message::ConnectionRequest { request_timestamp, .. } => {
                self.state = PeerState::Handshaking;
                let accept_timestamp = unix_timestamp_millis();
                let reply = wire::Message::ConnectionRequestAccepted {
                    client_address: self.address,
                    system_addresses: Vec::new(),
                    request_timestamp,
                    accept_timestamp,
                };
                self.send_internal(Reliability::Unreliable, &reply);
            }
            wire::Message::ConnectionRequestAccepted { .. } => {
                self.state = PeerState::Handshaking;
                let accept_timestamp = unix_timestamp_millis();
                let reply = wire::Message::NewIncomingConnection {
                    server_address: self.address,
                    system_addresses: Vec::new(),
                    request_timestamp: accept_timestamp,
                    accept_timestamp,
                };
                self.send_internal(Reliability::Unreliable, &reply);
                self.state = PeerState::LoggedIn;
                outputs.push(PeerOutput::LoggedIn);
            }
            wire::Message::NewIncomingConnection { .. } => {
                self.state = PeerState::LoggedIn;
                outputs.push(PeerOutput::LoggedIn);
            }
            wire::Message::ConnectedPing { client_timestamp } => {
                self.send_internal(
                    Reliability::Unreliable,
                    &wire::Message::ConnectedPong {
                        client_timestamp,
                        server_timestamp: unix_timestamp_millis(),
                    },
                );
            }
            wire::Message::ConnectedPong {
                client_timestamp,
                server_timestamp,
            } => {
                let rtt = server_timestamp.saturating_sub(client_timestamp);
                outputs.push(PeerOutput::Latency(Duration::from_millis(rtt)));
            }
            wire::Message::DetectLostConnections => {
                self.send_internal(
                    Reliability::Unreliable,
                    &wire::Message::ConnectedPing {
                        client_timestamp: unix_timestamp_millis(),
                    },
                );
            }
            wire::Message::DisconnectionNotification => {
                self.state = PeerState::Disconnected;
                outputs.push(PeerOutput::Disconnect(DisconnectReason::Notified));
            }
            _ => {}
        }
    }
}

struct DecodedFrame<'a> {
    reliability: Reliability,
    reliable_index: Option<u32>,
    sequence_index: Option<u32>,
    order_index: Option<u32>,
    channel: Channel,
    split: Option<(u16, u32, u32)>,
    payload: &'a [u8],
}

fn frame_header_len(reliability: Reliability, split: bool) -> usize {
    let mut n = FRAME_HEADER_SIZE;
    if reliability.is_reliable() {
        n += 3;
    }
    if reliability.is_sequenced() {
        n += 3;
    }
    if reliability.has_ordering_channel() {
        n += 3 + 1;
    }
    if split {
        n += FRAME_SPLIT_SIZE;
    }
    n
}

/// Splits `payload` into MTU-sized fragments for `reliability` (spec §4.4
/// outbound step 2). Always returns at least one fragment.
fn split_payload(payload: &[u8], reliability: Reliability, mtu: usize) -> Vec<&[u8]> {
    let unsplit_max = mtu.saturating_sub(
        UDP_HEADER_SIZE + DATAGRAM_HEADER_SIZE + frame_header_len(reliability, false),
    );

    if payload.len() <= unsplit_max || unsplit_max == 0 {
        return vec![payload];
    }

    let split_max = mtu
        .saturating_sub(UDP_HEADER_SIZE + DATAGRAM_HEADER_SIZE + frame_header_len(reliability, true))
        .max(1);

    payload.chunks(split_max).collect()
}

fn encode_frame(
    buf: &mut BytesMut,
    reliability: Reliability,
    reliable_index: Option<u32>,
    sequence_index: Option<u32>,
    order_index: Option<u32>,
    channel: Channel,
    split: Option<(u16, u32, u32)>,
    payload: &[u8],
) {
    let mut header = (reliability as u8) << 5;
    if split.is_some() {
        header |= FLAG_FRAGMENTED;
    }
    buf.put_u8(header);
    buf.put_u16(((payload.len() as u32) * 8) as u16);

    if let Some(index) = reliable_index {
        codec::write_u24::<LE>(buf, index);
    }

    if let Some(index) = sequence_index {
        codec::write_u24::<LE>(buf, index);
    }

    if let Some(index) = order_index {
        codec::write_u24::<LE>(buf, index);
        buf.put_u8(channel.0);
    }

    if let Some((split_id, split_count, split_index)) = split {
        buf.put_u32(split_count);
        buf.put_u16(split_id);
        buf.put_u32(split_index);
    }

    buf.put_slice(payload);
}

fn decode_frame<'a>(reader: &mut std::io::Cursor<&'a [u8]>) -> Result<DecodedFrame<'a>, RakNetError> {
    let header = reader
        .read_u8()
        .map_err(|_| RakNetError::MalformedField("truncated frame header"))?;

    let split_flag = header & FLAG_FRAGMENTED != 0;
    let reliability = Reliability::try_from((header & 0xE0) >> 5)?;

    let bits = reader
        .read_u16::<BE>()
        .map_err(|_| RakNetError::MalformedField("truncated frame length"))?;
    let len = ((bits as usize) + 7) / 8;

    if len == 0 {
        return Err(RakNetError::MalformedField("zero-length frame content"));
    }

    let reliable_index = if reliability.is_reliable() {
        Some(codec::read_u24::<LE>(reader)?)
    } else {
        None
    };

    let sequence_index = if reliability.is_sequenced() {
        Some(codec::read_u24::<LE>(reader)?)
    } else {
        None
    };

    let (order_index, channel) = if reliability.has_ordering_channel() {
        let index = codec::read_u24::<LE>(reader)?;
        let channel = reader
            .read_u8()
            .map_err(|_| RakNetError::MalformedField("truncated channel byte"))?;
        let channel = Channel(channel);
        channel.validate()?;
        (Some(index), channel)
    } else {
        (None, Channel(0))
    };

    let split = if split_flag {
        let split_count = reader
            .read_u32::<BE>()
            .map_err(|_| RakNetError::MalformedField("truncated split count"))?;
        let split_id = reader
            .read_u16::<BE>()
            .map_err(|_| RakNetError::MalformedField("truncated split id"))?;
        let split_index = reader
            .read_u32::<BE>()
            .map_err(|_| RakNetError::MalformedField("truncated split index"))?;
        Some((split_id, split_count, split_index))
    } else {
        None
    };

    if reader.remaining() < len {
        return Err(RakNetError::MalformedField("truncated frame payload"));
    }

    let start = reader.position() as usize;
    let payload = &reader.get_ref()[start..start + len];
    reader.advance(len);

    Ok(DecodedFrame {
        reliability,
        reliable_index,
        sequence_index,
        order_index,
        channel,
        split,
        payload,
    })
}

/// Condenses a set of sequence numbers into single/range records (spec
/// §4.2: "the codec *condenses* contiguous ids into ranges on send").
fn write_records(buf: &mut BytesMut, seqs: &[u32]) {
    if seqs.is_empty() {
        buf.put_i16(0);
        return;
    }

    let mut sorted = seqs.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut start = sorted[0];
    let mut end = sorted[0];

    for &seq in &sorted[1..] {
        if seq == end + 1 {
            end = seq;
        } else {
            ranges.push((start, end));
            start = seq;
            end = seq;
        }
    }
    ranges.push((start, end));

    buf.put_i16(ranges.len() as i16);
    for (start, end) in ranges {
        if start == end {
            buf.put_u8(1);
            codec::write_u24::<LE>(buf, start);
        } else {
            buf.put_u8(0);
            codec::write_u24::<LE>(buf, start);
            codec::write_u24::<LE>(buf, end);
        }
    }
}

/// Expands single/range records back into individual sequence numbers.
fn read_records(reader: &mut std::io::Cursor<&[u8]>) -> Result<Vec<u32>, RakNetError> {
    let count = reader
        .read_i16::<BE>()
        .map_err(|_| RakNetError::MalformedField("truncated record count"))?;

    let mut seqs = Vec::new();

    for _ in 0..count {
        let kind = reader
            .read_u8()
            .map_err(|_| RakNetError::MalformedField("truncated record type"))?;

        match kind {
            1 => seqs.push(codec::read_u24::<LE>(reader)?),
            0 => {
                let start = codec::read_u24::<LE>(reader)?;
                let end = codec::read_u24::<LE>(reader)?;
                seqs.extend(start..=end);
            }
            _ => return Err(RakNetError::MalformedField("invalid record type")),
        }
    }

    Ok(seqs)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn test_pair() -> (Peer, Peer) {
        let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let client_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let server_addr = server_socket.local_addr().unwrap();
        let client_addr = client_socket.local_addr().unwrap();
        server_socket.connect(client_addr).unwrap();
        client_socket.connect(server_addr).unwrap();

        let server = Peer::new(client_addr, 1, server_socket, 1200, None);
        let client = Peer::new(server_addr, 2, client_socket, 1200, None);

        (server, client)
    }

    #[test]
    fn records_round_trip_condensed() {
        let seqs = vec![0u32, 1, 2, 5, 7, 8, 9];
        let mut buf = BytesMut::new();
        write_records(&mut buf, &seqs);

        let mut reader = std::io::Cursor::new(&buf[..]);
        let mut expanded = read_records(&mut reader).unwrap();
        expanded.sort_unstable();

        let mut expected = seqs.clone();
        expected.sort_unstable();
        assert_eq!(expanded, expected);
    }

    #[test]
    fn reliable_send_delivers_exactly_once() {
        let (mut server, mut client) = test_pair();

        server.send_message(Reliability::Reliable, Channel(0), b"hello");
        server.flush_batch();

        let mut buf = [0u8; 1500];
        let len = client.socket_recv(&mut buf);
        let outputs = client.decode(&buf[..len]).unwrap();

        let messages: Vec<_> = outputs
            .into_iter()
            .filter_map(|o| match o {
                PeerOutput::Message { payload, .. } => Some(payload),
                _ => None,
            })
            .collect();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"hello");
    }

    #[test]
    fn reliable_ordered_delivers_in_order_despite_reordering() {
        let (mut server, mut client) = test_pair();
        let mut datagrams = Vec::new();

        for i in 0..5u32 {
            server.send_message(Reliability::ReliableOrdered, Channel(0), &i.to_be_bytes());
            server.flush_batch();
        }

        // Drain the server's socket directly instead of relying on
        // `flush_batch` timing, then feed the client in reverse order.
        let mut buf = [0u8; 1500];
        while let Ok(len) = client.socket_try_recv(&mut buf) {
            datagrams.push(buf[..len].to_vec());
        }

        let mut delivered = Vec::new();
        for datagram in datagrams.into_iter().rev() {
            for output in client.decode(&datagram).unwrap() {
                if let PeerOutput::Message { payload, .. } = output {
                    delivered.push(u32::from_be_bytes(payload[..4].try_into().unwrap()));
                }
            }
        }

        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn sequenced_drops_out_of_order_duplicates_and_stale() {
        let mut channel = SequencedChannel::new();
        let mut accepted = HashSet::new();

        for i in [0u32, 2, 1, 3] {
            if channel.accept(i) {
                accepted.insert(i);
            }
        }

        assert_eq!(accepted, HashSet::from([0, 2, 3]));
    }

    #[test]
    fn out_of_range_channel_is_rejected_not_indexed() {
        let (mut server, mut client) = test_pair();

        server.send_message(Reliability::ReliableOrdered, Channel(0), b"hi");
        server.flush_batch();

        let mut buf = [0u8; 1500];
        let len = client.socket_recv(&mut buf);
        let mut datagram = buf[..len].to_vec();

        // Overwrite the ordered frame's channel byte: 4-byte datagram
        // header, then the frame's 1-byte flags + 2-byte bit-length +
        // 3-byte reliable index + 3-byte order index precede it.
        let channel_byte_offset = 4 + 1 + 2 + 3 + 3;
        datagram[channel_byte_offset] = MAX_CHANNELS;

        assert!(matches!(
            client.decode(&datagram),
            Err(RakNetError::InvalidChannel(MAX_CHANNELS))
        ));
    }

    impl Peer {
        fn socket_recv(&self, buf: &mut [u8]) -> usize {
            self.socket.recv(buf).unwrap()
        }

        fn socket_try_recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.socket.set_nonblocking(true).unwrap();
            let result = self.socket.recv(buf);
            self.socket.set_nonblocking(false).unwrap();
            result
        }
    }
}
