// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Per-(session, stream id) input/output state: ordering, retention,
// ACK/NACK, heartbeat, and fragment reassembly.

use std::collections::{BTreeMap, HashMap};

use crate::submessage::{AcknackPayload, HeartbeatPayload};
use crate::wire::{StreamId, StreamKindTag};

pub const DEFAULT_RETENTION_WINDOW: usize = 16;
const NACK_BITMAP_BITS: u32 = 16;

/// Wrapping "a < b" over a 16-bit sequence space (half the space ahead
/// counts as "greater").
pub fn seq_lt(a: u16, b: u16) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff < 0x8000
}

fn seq_ge(a: u16, b: u16) -> bool {
    !seq_lt(a, b)
}

// ---------------------------------------------------------------------------
// Fragment reassembly
// ---------------------------------------------------------------------------

/// Accumulates FRAGMENT submessage payloads delivered in order on a
/// reliable stream until the "last fragment" marker arrives.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    buf: Vec<u8>,
    active: bool,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one in-order fragment. Returns the reassembled payload once the
    /// final fragment arrives.
    pub fn feed(&mut self, data: &[u8], last: bool) -> Option<Vec<u8>> {
        if !self.active {
            self.buf.clear();
            self.active = true;
        }
        self.buf.extend_from_slice(data);
        if last {
            self.active = false;
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

// ---------------------------------------------------------------------------
// Reliable input / output
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ReliableInput {
    next_expected: u16,
    out_of_order: HashMap<u16, Vec<u8>>,
    pub reassembly: FragmentReassembler,
}

impl Default for ReliableInput {
    // A reliable output side's first assigned sequence number is 1 (`ReliableOutput::send`
    // starts counting from `last_sent = 0`), so the matching input side must expect 1 first,
    // not 0, or the very first real message is always treated as out of order.
    fn default() -> Self {
        Self {
            next_expected: 1,
            out_of_order: HashMap::new(),
            reassembly: FragmentReassembler::new(),
        }
    }
}

impl ReliableInput {
    /// Accept sequence `seq`, returning every message now deliverable in
    /// order (possibly several, if buffered out-of-order arrivals close a
    /// gap; possibly none, if `seq` is a duplicate or itself out of order).
    pub fn accept(&mut self, seq: u16, bytes: Vec<u8>) -> Vec<(u16, Vec<u8>)> {
        if seq_lt(seq, self.next_expected) {
            return Vec::new();
        }
        if seq != self.next_expected {
            self.out_of_order.insert(seq, bytes);
            return Vec::new();
        }
        let mut delivered = vec![(seq, bytes)];
        self.next_expected = self.next_expected.wrapping_add(1);
        while let Some(next) = self.out_of_order.remove(&self.next_expected) {
            delivered.push((self.next_expected, next));
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        delivered
    }

    pub fn make_acknack(&self) -> AcknackPayload {
        let first_unacked = self.next_expected;
        let mut bitmap = 0u16;
        for i in 0..NACK_BITMAP_BITS {
            let seq = first_unacked.wrapping_add(i as u16);
            if !self.out_of_order.contains_key(&seq) {
                bitmap |= 1 << i;
            }
        }
        AcknackPayload {
            first_unacked,
            nack_bitmap: bitmap,
        }
    }

    /// A HEARTBEAT whose `last` exceeds our in-order position, or any gap,
    /// always has the input side reply with an ACKNACK.
    pub fn on_heartbeat(&mut self, _hb: &HeartbeatPayload) -> AcknackPayload {
        self.make_acknack()
    }

    pub fn reset(&mut self) {
        self.next_expected = 1;
        self.out_of_order.clear();
        self.reassembly.reset();
    }

    pub fn next_expected(&self) -> u16 {
        self.next_expected
    }
}

#[derive(Debug)]
pub struct ReliableOutput {
    retention: BTreeMap<u16, Vec<u8>>,
    first_unacked: u16,
    last_sent: u16,
    window: usize,
}

impl ReliableOutput {
    fn new(window: usize) -> Self {
        Self {
            retention: BTreeMap::new(),
            first_unacked: 0,
            last_sent: 0,
            window,
        }
    }

    /// Assign the next sequence number, retain the message, and return it.
    pub fn send(&mut self, bytes: Vec<u8>) -> u16 {
        let seq = self.last_sent.wrapping_add(1);
        self.last_sent = seq;
        self.retention.insert(seq, bytes);
        while self.retention.len() > self.window {
            if let Some(&oldest) = self.retention.keys().next() {
                self.retention.remove(&oldest);
            } else {
                break;
            }
        }
        seq
    }

    pub fn make_heartbeat(&self) -> HeartbeatPayload {
        HeartbeatPayload {
            first_unacked: self.first_unacked,
            last_sent: self.last_sent,
        }
    }

    /// Retransmit every retained message named by the bitmap and advance
    /// the retention window past `first_unacked - 1`.
    pub fn on_acknack(&mut self, ack: &AcknackPayload) -> Vec<(u16, Vec<u8>)> {
        let mut resend = Vec::new();
        for i in 0..NACK_BITMAP_BITS {
            if ack.nack_bitmap & (1 << i) != 0 {
                let seq = ack.first_unacked.wrapping_add(i as u16);
                if let Some(bytes) = self.retention.get(&seq) {
                    resend.push((seq, bytes.clone()));
                }
            }
        }
        if seq_ge(ack.first_unacked, self.first_unacked) {
            self.first_unacked = ack.first_unacked;
        }
        let floor = self.first_unacked;
        self.retention.retain(|&seq, _| seq_ge(seq, floor));
        resend
    }

    pub fn reset(&mut self) {
        self.retention.clear();
        self.first_unacked = 0;
        self.last_sent = 0;
    }
}

// ---------------------------------------------------------------------------
// Stream: one input side + one output side
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum InputSide {
    None,
    BestEffort { last_accepted: Option<u16> },
    Reliable(ReliableInput),
}

#[derive(Debug)]
enum OutputSide {
    None,
    BestEffort { next_seq: u16 },
    Reliable(ReliableOutput),
}

/// One (session, stream id) pair's full state.
#[derive(Debug)]
pub struct Stream {
    pub kind: StreamKindTag,
    input: InputSide,
    output: OutputSide,
}

impl Stream {
    pub fn new(stream_id: StreamId, retention_window: usize) -> Self {
        match stream_id.kind() {
            StreamKindTag::None => Self {
                kind: StreamKindTag::None,
                input: InputSide::None,
                output: OutputSide::None,
            },
            StreamKindTag::BestEffort => Self {
                kind: StreamKindTag::BestEffort,
                input: InputSide::BestEffort { last_accepted: None },
                output: OutputSide::BestEffort { next_seq: 0 },
            },
            StreamKindTag::Reliable => Self {
                kind: StreamKindTag::Reliable,
                input: InputSide::Reliable(ReliableInput::default()),
                output: OutputSide::Reliable(ReliableOutput::new(retention_window)),
            },
        }
    }

    /// Feed one received message's raw submessage bytes at sequence `seq`.
    /// Returns every `(seq, bytes)` now deliverable, in order.
    pub fn accept(&mut self, seq: u16, bytes: Vec<u8>) -> Vec<(u16, Vec<u8>)> {
        match &mut self.input {
            InputSide::None => vec![(0, bytes)],
            InputSide::BestEffort { last_accepted } => {
                let accept = match *last_accepted {
                    None => true,
                    Some(last) => seq_lt(last, seq),
                };
                if accept {
                    *last_accepted = Some(seq);
                    vec![(seq, bytes)]
                } else {
                    Vec::new()
                }
            }
            InputSide::Reliable(r) => r.accept(seq, bytes),
        }
    }

    /// Assign a sequence number to an outgoing message and retain it if the
    /// stream is reliable.
    pub fn send(&mut self, bytes: Vec<u8>) -> u16 {
        match &mut self.output {
            OutputSide::None => 0,
            OutputSide::BestEffort { next_seq } => {
                let seq = *next_seq;
                *next_seq = next_seq.wrapping_add(1);
                seq
            }
            OutputSide::Reliable(r) => r.send(bytes),
        }
    }

    pub fn make_heartbeat(&self) -> Option<HeartbeatPayload> {
        match &self.output {
            OutputSide::Reliable(r) => Some(r.make_heartbeat()),
            _ => None,
        }
    }

    pub fn on_acknack(&mut self, ack: &AcknackPayload) -> Vec<(u16, Vec<u8>)> {
        match &mut self.output {
            OutputSide::Reliable(r) => r.on_acknack(ack),
            _ => Vec::new(),
        }
    }

    pub fn on_heartbeat(&mut self, hb: &HeartbeatPayload) -> Option<AcknackPayload> {
        match &mut self.input {
            InputSide::Reliable(r) => Some(r.on_heartbeat(hb)),
            _ => None,
        }
    }

    pub fn reassembler_mut(&mut self) -> Option<&mut FragmentReassembler> {
        match &mut self.input {
            InputSide::Reliable(r) => Some(&mut r.reassembly),
            _ => None,
        }
    }

    /// Reset both sides' state, as when a RESET submessage arrives.
    pub fn reset(&mut self) {
        match &mut self.input {
            InputSide::Reliable(r) => r.reset(),
            InputSide::BestEffort { last_accepted } => *last_accepted = None,
            InputSide::None => {}
        }
        match &mut self.output {
            OutputSide::Reliable(r) => r.reset(),
            OutputSide::BestEffort { next_seq } => *next_seq = 0,
            OutputSide::None => {}
        }
    }
}

/// All streams of one session, created lazily on first use.
#[derive(Default)]
pub struct StreamSet {
    streams: HashMap<u8, Stream>,
    retention_window: usize,
}

impl StreamSet {
    pub fn new(retention_window: usize) -> Self {
        Self {
            streams: HashMap::new(),
            retention_window,
        }
    }

    pub fn get_or_create(&mut self, stream_id: StreamId) -> &mut Stream {
        self.streams
            .entry(stream_id.0)
            .or_insert_with(|| Stream::new(stream_id, self.retention_window))
    }

    pub fn get_mut(&mut self, stream_id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&stream_id.0)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u8, &mut Stream)> {
        self.streams.iter_mut().map(|(id, s)| (*id, s))
    }

    /// A RESET on stream 0 is a session-level reset: every stream resets.
    pub fn reset_all(&mut self) {
        for s in self.streams.values_mut() {
            s.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_effort_drops_non_monotone() {
        let mut s = Stream::new(StreamId(1), DEFAULT_RETENTION_WINDOW);
        assert_eq!(s.accept(5, vec![1]), vec![(5, vec![1])]);
        assert_eq!(s.accept(3, vec![2]), Vec::<(u16, Vec<u8>)>::new());
        assert_eq!(s.accept(6, vec![3]), vec![(6, vec![3])]);
    }

    #[test]
    fn none_stream_always_delivers_at_seq_zero() {
        let mut s = Stream::new(StreamId(0), DEFAULT_RETENTION_WINDOW);
        assert_eq!(s.accept(0, vec![9]), vec![(0, vec![9])]);
        assert_eq!(s.accept(0, vec![10]), vec![(0, vec![10])]);
    }

    #[test]
    fn reliable_buffers_out_of_order_and_delivers_on_gap_fill() {
        let mut s = Stream::new(StreamId(128), DEFAULT_RETENTION_WINDOW);
        assert_eq!(s.accept(1, vec![1]), vec![(1, vec![1])]);
        assert_eq!(s.accept(3, vec![3]), Vec::<(u16, Vec<u8>)>::new());
        assert_eq!(s.accept(4, vec![4]), Vec::<(u16, Vec<u8>)>::new());
        // filling the gap at seq 2 flushes 2,3,4 in order
        assert_eq!(
            s.accept(2, vec![2]),
            vec![(2, vec![2]), (3, vec![3]), (4, vec![4])]
        );
    }

    #[test]
    fn reliable_acknack_triggers_retransmit_and_advances_window() {
        let mut sender = Stream::new(StreamId(128), DEFAULT_RETENTION_WINDOW);
        for i in 0..10u16 {
            sender.send(vec![i as u8]);
        }
        // receiver gets everything except #3 and #7
        let mut receiver = ReliableInput::default();
        for seq in (1..=10u16).filter(|&seq| seq != 3 && seq != 7) {
            receiver.accept(seq, vec![seq as u8]);
        }
        let ack = receiver.make_acknack();
        assert_eq!(ack.first_unacked, 3);

        let resent = sender.on_acknack(&ack);
        let seqs: Vec<u16> = resent.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![3, 7]);
    }

    #[test]
    fn fragment_reassembler_waits_for_last() {
        let mut r = FragmentReassembler::new();
        assert!(r.feed(b"abc", false).is_none());
        assert!(r.is_active());
        assert!(r.feed(b"def", false).is_none());
        let whole = r.feed(b"ghi", true).unwrap();
        assert_eq!(whole, b"abcdefghi");
        assert!(!r.is_active());
    }

    #[test]
    fn reset_clears_reliable_state() {
        let mut s = Stream::new(StreamId(128), DEFAULT_RETENTION_WINDOW);
        s.send(vec![1]);
        s.accept(5, vec![2]);
        s.reset();
        assert_eq!(s.send(vec![9]), 1);
        assert_eq!(s.accept(1, vec![3]), vec![(1, vec![3])]);
    }

    #[test]
    fn seq_lt_wraps_correctly() {
        assert!(seq_lt(0, 1));
        assert!(seq_lt(0xFFFF, 0));
        assert!(!seq_lt(0, 0xFFFF));
    }
}
