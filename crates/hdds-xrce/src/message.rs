// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Message-level framing: header, submessage alignment, builder and cursor.

use crate::error::XrceError;
use crate::submessage::{decode_submessage, encode_submessage, Submessage, WirePayload};
use crate::wire::{pad_for, CdrReader, ClientKey, SessionId, StreamId};

pub const MESSAGE_HEADER_SIZE: usize = 8;
pub const SUBMESSAGE_HEADER_SIZE: usize = 4;

/// Encode one submessage into its wire frame (`id, flags, length` header
/// plus payload), without appending it to any message. Used both by
/// [`OutputMessage::append`] and by the engine when it needs the exact
/// bytes it is about to hand to a reliable stream's retention buffer.
/// Returns `None` if the encoded payload would overflow the 16-bit length
/// field.
pub fn frame_submessage(sub: &Submessage, little_endian: bool) -> Option<Vec<u8>> {
    let (id, flags, payload) = encode_submessage(sub, little_endian);
    if payload.len() > u16::MAX as usize {
        return None;
    }
    let mut frame = Vec::with_capacity(SUBMESSAGE_HEADER_SIZE + payload.len());
    frame.push(id);
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    Some(frame)
}

/// `{client_key, session_id, stream_id, sequence_nr}`, always little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub client_key: ClientKey,
    pub session_id: SessionId,
    pub stream_id: StreamId,
    pub sequence_nr: u16,
}

impl MessageHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, XrceError> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(XrceError::BufferTooShort);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[0..4]);
        Ok(Self {
            client_key: ClientKey(key),
            session_id: SessionId(buf[4]),
            stream_id: StreamId(buf[5]),
            sequence_nr: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        // Sessions >= 128 are identified by transport endpoint; the client
        // key is not meaningful on the wire for them.
        if self.session_id.carries_client_key() {
            buf.extend_from_slice(&self.client_key.0);
        } else {
            buf.extend_from_slice(&[0, 0, 0, 0]);
        }
        buf.push(self.session_id.0);
        buf.push(self.stream_id.0);
        buf.extend_from_slice(&self.sequence_nr.to_le_bytes());
    }
}

/// `{id, flags, length}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmessageHeader {
    pub submessage_id: u8,
    pub flags: u8,
    pub length: u16,
}

impl SubmessageHeader {
    fn parse(buf: &[u8]) -> Result<Self, XrceError> {
        if buf.len() < SUBMESSAGE_HEADER_SIZE {
            return Err(XrceError::BufferTooShort);
        }
        Ok(Self {
            submessage_id: buf[0],
            flags: buf[1],
            length: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }
}

// ---------------------------------------------------------------------------
// OutputMessage
// ---------------------------------------------------------------------------

/// Builds an outgoing message into a fixed-capacity buffer, appending
/// submessages at 4-byte boundaries relative to the message start.
pub struct OutputMessage {
    buf: Vec<u8>,
    capacity: usize,
}

impl OutputMessage {
    pub fn new(header: MessageHeader, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity.min(4096));
        header.write_to(&mut buf);
        Self { buf, capacity }
    }

    /// Append a submessage. Returns `false` (leaving the message unchanged)
    /// if `capacity` would be exceeded.
    pub fn append(&mut self, sub: &Submessage, little_endian: bool) -> bool {
        match frame_submessage(sub, little_endian) {
            Some(frame) => self.append_raw(&frame),
            None => false,
        }
    }

    /// Append an already-framed submessage (`id, flags, length` header plus
    /// payload, as produced by [`frame_submessage`] or retained by a reliable
    /// stream for retransmission) verbatim at the next 4-byte boundary.
    /// Returns `false` (leaving the message unchanged) if `capacity` would
    /// be exceeded.
    pub fn append_raw(&mut self, framed: &[u8]) -> bool {
        let pad = pad_for(self.buf.len(), 4);
        if self.buf.len() + pad + framed.len() > self.capacity {
            return false;
        }
        self.buf.resize(self.buf.len() + pad, 0);
        self.buf.extend_from_slice(framed);
        true
    }

    pub fn is_empty_of_submessages(&self) -> bool {
        self.buf.len() <= MESSAGE_HEADER_SIZE
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// InputMessage
// ---------------------------------------------------------------------------

/// A read cursor over an incoming message's submessages.
pub struct InputMessage<'a> {
    pub header: MessageHeader,
    buf: &'a [u8],
    pos: usize,
    payload_end: usize,
    current: Option<SubmessageHeader>,
}

impl<'a> InputMessage<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, XrceError> {
        let header = MessageHeader::parse(buf)?;
        Ok(Self {
            header,
            buf,
            pos: MESSAGE_HEADER_SIZE,
            payload_end: MESSAGE_HEADER_SIZE,
            current: None,
        })
    }

    /// Advance to the next 4-byte-aligned submessage header. `Ok(false)` at
    /// end of buffer; `Err` on a truncated header or payload.
    pub fn prepare_next_submessage(&mut self) -> Result<bool, XrceError> {
        let aligned = self.payload_end + pad_for(self.payload_end, 4);
        if aligned >= self.buf.len() {
            self.current = None;
            return Ok(false);
        }
        if aligned + SUBMESSAGE_HEADER_SIZE > self.buf.len() {
            return Err(XrceError::BufferTooShort);
        }
        let hdr = SubmessageHeader::parse(&self.buf[aligned..])?;
        let payload_start = aligned + SUBMESSAGE_HEADER_SIZE;
        let payload_end = payload_start + hdr.length as usize;
        if payload_end > self.buf.len() {
            return Err(XrceError::BufferTooShort);
        }
        self.current = Some(hdr);
        self.pos = payload_start;
        self.payload_end = payload_end;
        Ok(true)
    }

    pub fn current_submessage_id(&self) -> Option<u8> {
        self.current.map(|h| h.submessage_id)
    }

    /// Deserialize the current submessage payload as a specific type,
    /// bounded by the submessage's declared length.
    pub fn get_payload<T: WirePayload>(&mut self) -> Result<T, XrceError> {
        let hdr = self.current.ok_or(XrceError::PayloadLengthMismatch)?;
        let little_endian = hdr.flags & crate::submessage::FLAG_BIG_ENDIAN == 0;
        let slice = &self.buf[self.pos..self.payload_end];
        let mut r = CdrReader::new(slice, little_endian);
        T::read(&mut r)
    }

    /// Deserialize the current submessage as the generic [`Submessage`]
    /// union, dispatching on its id.
    pub fn current_submessage(&self) -> Result<Submessage, XrceError> {
        let hdr = self.current.ok_or(XrceError::PayloadLengthMismatch)?;
        let slice = &self.buf[self.pos..self.payload_end];
        decode_submessage(hdr.submessage_id, hdr.flags, slice)
    }
}
