//! Inbound dedup/ordering/sequencing/split-reassembly windows and the
//! outbound retransmission bookkeeping (spec §3 "Peer" inbound/outbound
//! state, §4.4 "Reliability Engine").

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

/// Bound on how far ahead of the low-water mark a datagram sequence
/// number or reliable index may be before it is rejected outright. Keeps
/// the dedup sets from growing without bound across a long connection.
pub const WINDOW_SIZE: u32 = 2048;

/// A receipt handle returned to the application for `*_WITH_ACK_RECEIPT`
/// sends (spec §6: `send_message(...) -> Option<ReceiptHandle>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiptId(pub u64);

/// Tracks inbound datagram sequence numbers: dedups, computes the ACK/NACK
/// sets from gaps, and exposes them for the tick's ACK/NACK flush.
#[derive(Debug, Default)]
pub struct DatagramWindow {
    highest: Option<u32>,
    seen: BTreeSet<u32>,
    pending_ack: Vec<u32>,
    pending_nack: BTreeSet<u32>,
}

impl DatagramWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inbound datagram sequence number. Returns `false` if the
    /// datagram is a duplicate and must be dropped without further
    /// decoding (spec §4.4 inbound step 1).
    pub fn receive(&mut self, seq: u32) -> bool {
        if !self.seen.insert(seq) {
            return false;
        }

        self.pending_nack.remove(&seq);
        self.pending_ack.push(seq);

        match self.highest {
            None => self.highest = Some(seq),
            Some(highest) if seq > highest => {
                for gap in (highest + 1)..seq {
                    if !self.seen.contains(&gap) {
                        self.pending_nack.insert(gap);
                    }
                }
                self.highest = Some(seq);
            }
            _ => {}
        }

        if let Some(highest) = self.highest {
            let low_water = highest.saturating_sub(WINDOW_SIZE);
            self.seen = self.seen.split_off(&low_water);
        }

        true
    }

    /// Drains the pending ACK set for emission, per spec §4.4: "if the ACK
    /// set is non-empty, emit an ACK datagram ... and clear it."
    pub fn take_acks(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_ack)
    }

    /// Drains the pending NACK set for emission.
    pub fn take_nacks(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_nack).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_ack.is_empty() || !self.pending_nack.is_empty()
    }
}

/// Dedups reliable indices and tracks the highest contiguously-received
/// one, so the seen set can be pruned instead of growing forever.
#[derive(Debug, Default)]
pub struct ReliableWindow {
    highest_contiguous: Option<u32>,
    seen: BTreeSet<u32>,
}

impl ReliableWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `index` is seen, `false` for any
    /// repeat (spec invariant: "the inbound side accepts any index at
    /// most once").
    pub fn accept(&mut self, index: u32) -> bool {
        if let Some(highest) = self.highest_contiguous {
            if index <= highest {
                return false;
            }
        }

        if !self.seen.insert(index) {
            return false;
        }

        let mut next = self.highest_contiguous.map_or(0, |h| h + 1);
        while self.seen.remove(&next) {
            self.highest_contiguous = Some(next);
            next += 1;
        }

        true
    }
}

/// Per-channel ordered delivery: buffers out-of-order arrivals and drains
/// the contiguous prefix starting at the next-expected index.
#[derive(Debug, Default)]
pub struct OrderedChannel {
    next_expected: u32,
    pending: BTreeMap<u32, Bytes>,
}

impl OrderedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `payload` at `index`. Returns every payload now deliverable
    /// in order, which may be empty (still waiting on an earlier gap), one
    /// (the common case), or several (a gap that just closed).
    pub fn receive(&mut self, index: u32, payload: Bytes) -> Vec<Bytes> {
        if index < self.next_expected {
            return Vec::new();
        }

        self.pending.insert(index, payload);

        let mut ready = Vec::new();
        while let Some(payload) = self.pending.remove(&self.next_expected) {
            ready.push(payload);
            self.next_expected += 1;
        }

        ready
    }
}

/// Per-channel sequenced delivery: latest-wins, any index at or below the
/// highest seen is dropped.
#[derive(Debug, Default)]
pub struct SequencedChannel {
    highest: Option<u32>,
}

impl SequencedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, index: u32) -> bool {
        if let Some(highest) = self.highest {
            if index <= highest {
                return false;
            }
        }

        self.highest = Some(index);
        true
    }
}

/// Accumulates fragments of one split encapsulated message until all
/// `split count` are present, then reassembles them in index order
/// regardless of arrival order.
///
/// The teacher's `SplitWindow` used `Vec::insert(index, ..)` into a
/// capacity-only-reserved vector, which panics whenever a fragment with
/// `index > fragments.len()` arrives before its predecessors — exactly
/// the out-of-order case spec §3 requires to work. This rebuilds it with
/// a fixed-size slot table instead.
#[derive(Debug)]
pub struct SplitAssembly {
    total: u32,
    received: u32,
    fragments: Vec<Option<Bytes>>,
}

impl SplitAssembly {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            received: 0,
            fragments: vec![None; total as usize],
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Stores fragment `index`. Returns the reassembled payload once every
    /// fragment has arrived.
    pub fn receive(&mut self, index: u32, fragment: Bytes) -> Option<Bytes> {
        let slot = self.fragments.get_mut(index as usize)?;

        if slot.is_none() {
            *slot = Some(fragment);
            self.received += 1;
        }

        if self.received != self.total {
            return None;
        }

        let mut whole = BytesMut::new();
        for part in &self.fragments {
            whole.extend_from_slice(part.as_ref().expect("all fragments present"));
        }

        Some(whole.freeze())
    }
}

struct OutboundFrame {
    bytes: Bytes,
    sent_at: Instant,
    datagram_seq: u32,
    receipt: Option<ReceiptId>,
}

/// Outbound unacknowledged-reliable bookkeeping (spec §3 "outbound
/// unacknowledged set" + "pending ACK/NACK set"). Keyed primarily by
/// reliable index, with a secondary datagram-sequence index so a single
/// ACK/NACK covering a whole datagram resolves every reliable frame it
/// carried in one lookup — mirrors the teacher's `recovery_window`, but
/// per-message rather than per whole-datagram-body, so that a NACK never
/// retransmits an `UNRELIABLE_WITH_ACK_RECEIPT` frame that happened to
/// share a datagram with a reliable one (spec §4.4: such a frame is
/// surfaced as not-acknowledged but never resent).
#[derive(Default)]
pub struct RecoveryWindow {
    by_reliable_index: HashMap<u32, OutboundFrame>,
    by_datagram: HashMap<u32, Vec<u32>>,
    unreliable_receipts: HashMap<u32, Vec<ReceiptId>>,
    last_rtt: Duration,
}

impl RecoveryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reliable frame's bytes under the datagram sequence number
    /// it was just packed into.
    pub fn record_reliable(
        &mut self,
        reliable_index: u32,
        datagram_seq: u32,
        bytes: Bytes,
        receipt: Option<ReceiptId>,
    ) {
        self.by_reliable_index.insert(
            reliable_index,
            OutboundFrame {
                bytes,
                sent_at: Instant::now(),
                datagram_seq,
                receipt,
            },
        );
        self.by_datagram
            .entry(datagram_seq)
            .or_default()
            .push(reliable_index);
    }

    /// Records that an unreliable, ack-receipt-requesting frame went out
    /// under `datagram_seq`. It is never retransmitted, only surfaced as
    /// acknowledged or not-acknowledged.
    pub fn record_unreliable_receipt(&mut self, datagram_seq: u32, receipt: ReceiptId) {
        self.unreliable_receipts
            .entry(datagram_seq)
            .or_default()
            .push(receipt);
    }

    /// Resolves every frame carried by an ACKed datagram. Returns the
    /// receipts to surface via `on_acknowledge`.
    pub fn acknowledge(&mut self, datagram_seq: u32) -> Vec<ReceiptId> {
        let mut receipts = Vec::new();

        if let Some(indices) = self.by_datagram.remove(&datagram_seq) {
            for index in indices {
                if let Some(frame) = self.by_reliable_index.remove(&index) {
                    self.last_rtt = frame.sent_at.elapsed();
                    if let Some(receipt) = frame.receipt {
                        receipts.push(receipt);
                    }
                }
            }
        }

        if let Some(unreliable) = self.unreliable_receipts.remove(&datagram_seq) {
            receipts.extend(unreliable);
        }

        receipts
    }

    /// Resolves every frame carried by a NACKed datagram. Returns the
    /// reliable frames (their original reliable index, so a retransmit can
    /// be re-recorded under the same index, plus their raw bytes for
    /// immediate re-batching under a fresh datagram sequence number) and
    /// the not-acknowledge receipts for any unreliable ack-receipt frames
    /// (never retransmitted).
    pub fn nack(&mut self, datagram_seq: u32) -> (Vec<(u32, Bytes, Option<ReceiptId>)>, Vec<ReceiptId>) {
        let mut frames = Vec::new();

        if let Some(indices) = self.by_datagram.remove(&datagram_seq) {
            for index in indices {
                if let Some(frame) = self.by_reliable_index.remove(&index) {
                    frames.push((index, frame.bytes, frame.receipt));
                }
            }
        }

        let not_acked = self.unreliable_receipts.remove(&datagram_seq).unwrap_or_default();

        (frames, not_acked)
    }

    /// Returns every reliable frame that has been unacknowledged for at
    /// least `timeout` (its reliable index, bytes, and receipt), removing
    /// it from its old datagram's bookkeeping so the caller can re-record
    /// it under a fresh sequence number.
    pub fn expired(&mut self, timeout: Duration) -> Vec<(u32, Bytes, Option<ReceiptId>)> {
        let stale: Vec<u32> = self
            .by_reliable_index
            .iter()
            .filter(|(_, frame)| frame.sent_at.elapsed() >= timeout)
            .map(|(index, _)| *index)
            .collect();

        let mut out = Vec::with_capacity(stale.len());

        for index in stale {
            if let Some(frame) = self.by_reliable_index.remove(&index) {
                if let Some(carried) = self.by_datagram.get_mut(&frame.datagram_seq) {
                    carried.retain(|&i| i != index);
                    if carried.is_empty() {
                        self.by_datagram.remove(&frame.datagram_seq);
                    }
                }
                out.push((index, frame.bytes, frame.receipt));
            }
        }

        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_reliable_index.is_empty()
    }

    pub fn rtt(&self) -> Duration {
        self.last_rtt
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicate_datagram_is_rejected() {
        let mut w = DatagramWindow::new();
        assert!(w.receive(0));
        assert!(!w.receive(0));
    }

    #[test]
    fn gap_is_nacked_once_then_cleared() {
        let mut w = DatagramWindow::new();
        w.receive(0);
        w.receive(2);
        assert_eq!(w.take_nacks(), vec![1]);
        assert!(w.take_nacks().is_empty());
    }

    #[test]
    fn reliable_window_dedups_out_of_order() {
        let mut w = ReliableWindow::new();
        assert!(w.accept(2));
        assert!(w.accept(0));
        assert!(w.accept(1));
        assert!(!w.accept(0));
        assert!(!w.accept(1));
        assert!(!w.accept(2));
        assert!(w.accept(3));
    }

    #[test]
    fn ordered_channel_buffers_and_drains_in_order() {
        let mut c = OrderedChannel::new();
        assert!(c.receive(1, Bytes::from_static(b"b")).is_empty());
        assert!(c.receive(2, Bytes::from_static(b"c")).is_empty());
        let drained = c.receive(0, Bytes::from_static(b"a"));
        assert_eq!(
            drained,
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c")
            ]
        );
    }

    #[test]
    fn sequenced_channel_drops_stale_indices() {
        let mut c = SequencedChannel::new();
        assert!(c.accept(5));
        assert!(!c.accept(3));
        assert!(c.accept(6));
    }

    #[test]
    fn split_assembly_reassembles_regardless_of_order() {
        let mut split = SplitAssembly::new(3);
        assert!(split.receive(2, Bytes::from_static(b"ld")).is_none());
        assert!(split.receive(0, Bytes::from_static(b"hel")).is_none());
        let whole = split.receive(1, Bytes::from_static(b"lo wor")).unwrap();
        assert_eq!(&whole[..], b"hello world");
    }

    #[test]
    fn recovery_window_ack_removes_and_returns_receipts() {
        let mut r = RecoveryWindow::new();
        r.record_reliable(0, 10, Bytes::from_static(b"a"), Some(ReceiptId(1)));
        r.record_reliable(1, 10, Bytes::from_static(b"b"), None);
        let receipts = r.acknowledge(10);
        assert_eq!(receipts, vec![ReceiptId(1)]);
        assert!(r.is_empty());
    }

    #[test]
    fn recovery_window_nack_returns_frames_for_resend() {
        let mut r = RecoveryWindow::new();
        r.record_reliable(0, 10, Bytes::from_static(b"a"), None);
        r.record_unreliable_receipt(10, ReceiptId(9));
        let (frames, not_acked) = r.nack(10);
        assert_eq!(frames, vec![(0, Bytes::from_static(b"a"), None)]);
        assert_eq!(not_acked, vec![ReceiptId(9)]);
        assert!(r.is_empty());
    }
}
