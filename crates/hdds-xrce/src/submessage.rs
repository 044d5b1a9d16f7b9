// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// XRCE submessage kinds and their wire payloads.

use crate::error::XrceError;
use crate::wire::{CdrReader, CdrWriter, ClientKey, ObjectId, RequestId, SessionId, StreamId};

/// The four bytes that must open every CREATE_CLIENT payload.
pub const XRCE_COOKIE: [u8; 4] = [0x58, 0x52, 0x43, 0x45]; // "XRCE"

/// Protocol version this agent implements.
pub const XRCE_VERSION: (u8, u8) = (0x01, 0x00);

// ---------------------------------------------------------------------------
// Submessage ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubmessageId {
    CreateClient = 0x00,
    Create = 0x01,
    GetInfo = 0x02,
    Delete = 0x03,
    StatusAgent = 0x04,
    Status = 0x05,
    Info = 0x06,
    WriteData = 0x07,
    ReadData = 0x08,
    Data = 0x09,
    Acknack = 0x0A,
    Heartbeat = 0x0B,
    Reset = 0x0C,
    Fragment = 0x0D,
    Timestamp = 0x0E,
    TimestampReply = 0x0F,
}

impl SubmessageId {
    pub fn from_u8(v: u8) -> Result<Self, XrceError> {
        Ok(match v {
            0x00 => Self::CreateClient,
            0x01 => Self::Create,
            0x02 => Self::GetInfo,
            0x03 => Self::Delete,
            0x04 => Self::StatusAgent,
            0x05 => Self::Status,
            0x06 => Self::Info,
            0x07 => Self::WriteData,
            0x08 => Self::ReadData,
            0x09 => Self::Data,
            0x0A => Self::Acknack,
            0x0B => Self::Heartbeat,
            0x0C => Self::Reset,
            0x0D => Self::Fragment,
            0x0E => Self::Timestamp,
            0x0F => Self::TimestampReply,
            other => return Err(XrceError::UnknownSubmessageId(other)),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Flags bit 0: payload endianness (0 = little, 1 = big). Bit 1 is reused by
/// FRAGMENT as the "last fragment" marker; unused elsewhere.
pub const FLAG_BIG_ENDIAN: u8 = 0x01;
pub const FLAG_FRAGMENT_LAST: u8 = 0x02;

// ---------------------------------------------------------------------------
// Wire-level status
// ---------------------------------------------------------------------------

/// `StatusValue`: the error taxonomy carried verbatim on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusValue {
    Ok = 0x00,
    OkMatched = 0x01,
    DdsError = 0x02,
    MismatchError = 0x03,
    AlreadyExistsError = 0x04,
    Denied = 0x05,
    UnknownReferenceError = 0x06,
    InvalidDataError = 0x07,
    Incompatible = 0x08,
    ResourcesError = 0x09,
}

impl StatusValue {
    pub fn from_u8(v: u8) -> Result<Self, XrceError> {
        Ok(match v {
            0x00 => Self::Ok,
            0x01 => Self::OkMatched,
            0x02 => Self::DdsError,
            0x03 => Self::MismatchError,
            0x04 => Self::AlreadyExistsError,
            0x05 => Self::Denied,
            0x06 => Self::UnknownReferenceError,
            0x07 => Self::InvalidDataError,
            0x08 => Self::Incompatible,
            0x09 => Self::ResourcesError,
            other => return Err(XrceError::UnknownStatusCode(other)),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::OkMatched)
    }
}

// ---------------------------------------------------------------------------
// WirePayload
// ---------------------------------------------------------------------------

/// A type that can be serialized/deserialized as a submessage payload.
///
/// `serialized_size` works by dry-running the write: it writes into a
/// scratch buffer pre-padded to `current_alignment` bytes and reports how
/// many bytes the real write would add, so it is always in sync with
/// `write`.
pub trait WirePayload: Sized {
    fn write(&self, w: &mut CdrWriter);
    fn read(r: &mut CdrReader) -> Result<Self, XrceError>;

    fn serialized_size(&self, current_alignment: usize) -> usize {
        let mut buf = vec![0u8; current_alignment];
        {
            let mut w = CdrWriter::new(&mut buf, 0, true);
            self.write(&mut w);
        }
        buf.len() - current_alignment
    }
}

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

/// The `{reuse, replace}` bit pair controlling CREATE collision handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationMode {
    pub reuse: bool,
    pub replace: bool,
}

impl CreationMode {
    fn to_byte(self) -> u8 {
        (self.reuse as u8) | ((self.replace as u8) << 1)
    }

    fn from_byte(b: u8) -> Self {
        Self {
            reuse: b & 0x01 != 0,
            replace: b & 0x02 != 0,
        }
    }
}

/// How a CREATE payload describes the entity to create. Flat, tagged arms
/// in place of the source's class hierarchy of `OBJK_*_Representation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRepresentation {
    ByRef(String),
    ByXml(String),
    ByBinary(Vec<u8>),
}

impl ObjectRepresentation {
    fn write(&self, w: &mut CdrWriter) {
        match self {
            Self::ByRef(s) => {
                w.write_u8(0);
                w.write_string(s);
            }
            Self::ByXml(s) => {
                w.write_u8(1);
                w.write_string(s);
            }
            Self::ByBinary(b) => {
                w.write_u8(2);
                w.write_octet_seq(b);
            }
        }
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(match r.read_u8()? {
            0 => Self::ByRef(r.read_string()?),
            1 => Self::ByXml(r.read_string()?),
            2 => Self::ByBinary(r.read_octet_seq()?),
            other => return Err(XrceError::BadDiscriminant(other as u32)),
        })
    }

    /// True when this representation is equal, for CREATE's match-existing
    /// check, to another representation of the same textual/binary form.
    /// Actual semantic matching against a live middleware entity is the
    /// middleware's job (`Middleware::match_ref`/`match_xml`); this is only
    /// used to compare two representations supplied by the same client.
    pub fn same_form_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// Agent metadata returned by GET_INFO and CREATE_CLIENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentInfo {
    pub xrce_version: (u8, u8),
    pub vendor_id: [u8; 2],
    pub availability: u8,
}

impl AgentInfo {
    pub fn this_agent() -> Self {
        Self {
            xrce_version: XRCE_VERSION,
            vendor_id: [0x01, 0x0F],
            availability: 1,
        }
    }

    fn write(&self, w: &mut CdrWriter) {
        w.write_u8(self.xrce_version.0);
        w.write_u8(self.xrce_version.1);
        w.write_u8(self.vendor_id[0]);
        w.write_u8(self.vendor_id[1]);
        w.write_u8(self.availability);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            xrce_version: (r.read_u8()?, r.read_u8()?),
            vendor_id: [r.read_u8()?, r.read_u8()?],
            availability: r.read_u8()?,
        })
    }
}

/// Bounds on a READ_DATA subscription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryControl {
    pub max_samples: u16,
    pub max_elapsed_time_ms: u32,
    pub max_bytes_per_sec: u32,
    pub min_pace_period_ms: u32,
}

impl DeliveryControl {
    pub const UNBOUNDED: DeliveryControl = DeliveryControl {
        max_samples: 0,
        max_elapsed_time_ms: 0,
        max_bytes_per_sec: 0,
        min_pace_period_ms: 0,
    };

    fn write(&self, w: &mut CdrWriter) {
        w.write_u16(self.max_samples);
        w.write_u32(self.max_elapsed_time_ms);
        w.write_u32(self.max_bytes_per_sec);
        w.write_u32(self.min_pace_period_ms);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            max_samples: r.read_u16()?,
            max_elapsed_time_ms: r.read_u32()?,
            max_bytes_per_sec: r.read_u32()?,
            min_pace_period_ms: r.read_u32()?,
        })
    }
}

/// Shape of the samples a read job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataFormat {
    Data = 0,
    DataWithInfo = 1,
    DataSeq = 2,
    PackedSamples = 3,
}

impl DataFormat {
    fn from_u8(v: u8) -> Result<Self, XrceError> {
        Ok(match v {
            0 => Self::Data,
            1 => Self::DataWithInfo,
            2 => Self::DataSeq,
            3 => Self::PackedSamples,
            other => return Err(XrceError::BadDiscriminant(other as u32)),
        })
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateClientPayload {
    pub request_id: RequestId,
    pub client_key: ClientKey,
    pub cookie: [u8; 4],
    pub version: (u8, u8),
    pub requested_session_id: SessionId,
    pub properties: Vec<(String, String)>,
}

impl CreateClientPayload {
    pub fn cookie_valid(&self) -> bool {
        self.cookie == XRCE_COOKIE
    }

    pub fn version_compatible(&self) -> bool {
        self.version.0 == XRCE_VERSION.0
    }
}

impl WirePayload for CreateClientPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.request_id);
        w.write_client_key(self.client_key);
        w.write_bytes_raw(&self.cookie);
        w.write_u8(self.version.0);
        w.write_u8(self.version.1);
        w.write_u8(self.requested_session_id.0);
        w.write_u32(self.properties.len() as u32);
        for (k, v) in &self.properties {
            w.write_string(k);
            w.write_string(v);
        }
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        let request_id = r.read_request_id()?;
        let client_key = r.read_client_key()?;
        let mut cookie = [0u8; 4];
        cookie.copy_from_slice(r.read_bytes_raw(4)?);
        let version = (r.read_u8()?, r.read_u8()?);
        let requested_session_id = SessionId(r.read_u8()?);
        let count = r.read_u32()? as usize;
        let mut properties = Vec::with_capacity(count);
        for _ in 0..count {
            properties.push((r.read_string()?, r.read_string()?));
        }
        Ok(Self {
            request_id,
            client_key,
            cookie,
            version,
            requested_session_id,
            properties,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayload {
    pub request_id: RequestId,
    pub object_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub creation_mode: CreationMode,
    pub representation: ObjectRepresentation,
}

impl WirePayload for CreatePayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.request_id);
        w.write_object_id(self.object_id);
        w.write_u8(self.parent_ids.len() as u8);
        for p in &self.parent_ids {
            w.write_object_id(*p);
        }
        w.write_u8(self.creation_mode.to_byte());
        self.representation.write(w);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        let request_id = r.read_request_id()?;
        let object_id = r.read_object_id()?;
        let parent_count = r.read_u8()? as usize;
        let mut parent_ids = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parent_ids.push(r.read_object_id()?);
        }
        let creation_mode = CreationMode::from_byte(r.read_u8()?);
        let representation = ObjectRepresentation::read(r)?;
        Ok(Self {
            request_id,
            object_id,
            parent_ids,
            creation_mode,
            representation,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetInfoPayload {
    pub request_id: RequestId,
}

impl WirePayload for GetInfoPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.request_id);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            request_id: r.read_request_id()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletePayload {
    pub request_id: RequestId,
    pub object_id: ObjectId,
}

impl WirePayload for DeletePayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.request_id);
        w.write_object_id(self.object_id);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            request_id: r.read_request_id()?,
            object_id: r.read_object_id()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAgentPayload {
    pub related_request: RequestId,
    pub result: StatusValue,
    pub agent_info: AgentInfo,
}

impl WirePayload for StatusAgentPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.related_request);
        w.write_u8(self.result.as_u8());
        self.agent_info.write(w);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            related_request: r.read_request_id()?,
            result: StatusValue::from_u8(r.read_u8()?)?,
            agent_info: AgentInfo::read(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    pub related_request: RequestId,
    pub object_id: ObjectId,
    pub result: StatusValue,
}

impl WirePayload for StatusPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.related_request);
        w.write_object_id(self.object_id);
        w.write_u8(self.result.as_u8());
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            related_request: r.read_request_id()?,
            object_id: r.read_object_id()?,
            result: StatusValue::from_u8(r.read_u8()?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoPayload {
    pub related_request: RequestId,
    pub agent_info: AgentInfo,
}

impl WirePayload for InfoPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.related_request);
        self.agent_info.write(w);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            related_request: r.read_request_id()?,
            agent_info: AgentInfo::read(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDataPayload {
    pub writer_id: ObjectId,
    pub data: Vec<u8>,
}

impl WirePayload for WriteDataPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_object_id(self.writer_id);
        w.write_octet_seq(&self.data);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            writer_id: r.read_object_id()?,
            data: r.read_octet_seq()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDataPayload {
    pub request_id: RequestId,
    pub reader_id: ObjectId,
    pub preferred_stream_id: StreamId,
    pub delivery_control: DeliveryControl,
    pub data_format: DataFormat,
}

impl WirePayload for ReadDataPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_request_id(self.request_id);
        w.write_object_id(self.reader_id);
        w.write_u8(self.preferred_stream_id.0);
        w.write_u8(self.data_format as u8);
        self.delivery_control.write(w);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            request_id: r.read_request_id()?,
            reader_id: r.read_object_id()?,
            preferred_stream_id: StreamId(r.read_u8()?),
            data_format: DataFormat::from_u8(r.read_u8()?)?,
            delivery_control: DeliveryControl::read(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    pub reader_id: ObjectId,
    pub data: Vec<u8>,
}

impl WirePayload for DataPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_object_id(self.reader_id);
        w.write_octet_seq(&self.data);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            reader_id: r.read_object_id()?,
            data: r.read_octet_seq()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub first_unacked: u16,
    pub last_sent: u16,
}

impl WirePayload for HeartbeatPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_u16(self.first_unacked);
        w.write_u16(self.last_sent);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            first_unacked: r.read_u16()?,
            last_sent: r.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknackPayload {
    pub first_unacked: u16,
    pub nack_bitmap: u16,
}

impl WirePayload for AcknackPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_u16(self.first_unacked);
        w.write_u16(self.nack_bitmap);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            first_unacked: r.read_u16()?,
            nack_bitmap: r.read_u16()?,
        })
    }
}

/// RESET carries no payload; the header's `stream_id` names the target
/// (stream 0 triggers a session-level reset of every stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetPayload;

impl WirePayload for ResetPayload {
    fn write(&self, _w: &mut CdrWriter) {}

    fn read(_r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self)
    }
}

/// `last` is carried in the submessage flags, not the payload bytes; callers
/// populate it from `FLAG_FRAGMENT_LAST` when decoding (see
/// [`decode_submessage`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FragmentPayload {
    pub fragment_nr: u16,
    pub last: bool,
    pub data: Vec<u8>,
}

impl WirePayload for FragmentPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_u16(self.fragment_nr);
        w.write_octet_seq(&self.data);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            fragment_nr: r.read_u16()?,
            last: false,
            data: r.read_octet_seq()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPayload {
    pub transmit_timestamp: u64,
}

impl WirePayload for TimestampPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_u64(self.transmit_timestamp);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            transmit_timestamp: r.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampReplyPayload {
    pub originator_transmit_timestamp: u64,
    pub receive_timestamp: u64,
    pub transmit_timestamp: u64,
}

impl WirePayload for TimestampReplyPayload {
    fn write(&self, w: &mut CdrWriter) {
        w.write_u64(self.originator_transmit_timestamp);
        w.write_u64(self.receive_timestamp);
        w.write_u64(self.transmit_timestamp);
    }

    fn read(r: &mut CdrReader) -> Result<Self, XrceError> {
        Ok(Self {
            originator_transmit_timestamp: r.read_u64()?,
            receive_timestamp: r.read_u64()?,
            transmit_timestamp: r.read_u64()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Unified submessage enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    CreateClient(CreateClientPayload),
    Create(CreatePayload),
    GetInfo(GetInfoPayload),
    Delete(DeletePayload),
    StatusAgent(StatusAgentPayload),
    Status(StatusPayload),
    Info(InfoPayload),
    WriteData(WriteDataPayload),
    ReadData(ReadDataPayload),
    Data(DataPayload),
    Acknack(AcknackPayload),
    Heartbeat(HeartbeatPayload),
    Reset(ResetPayload),
    Fragment(FragmentPayload),
    Timestamp(TimestampPayload),
    TimestampReply(TimestampReplyPayload),
}

impl Submessage {
    pub fn id(&self) -> SubmessageId {
        match self {
            Self::CreateClient(_) => SubmessageId::CreateClient,
            Self::Create(_) => SubmessageId::Create,
            Self::GetInfo(_) => SubmessageId::GetInfo,
            Self::Delete(_) => SubmessageId::Delete,
            Self::StatusAgent(_) => SubmessageId::StatusAgent,
            Self::Status(_) => SubmessageId::Status,
            Self::Info(_) => SubmessageId::Info,
            Self::WriteData(_) => SubmessageId::WriteData,
            Self::ReadData(_) => SubmessageId::ReadData,
            Self::Data(_) => SubmessageId::Data,
            Self::Acknack(_) => SubmessageId::Acknack,
            Self::Heartbeat(_) => SubmessageId::Heartbeat,
            Self::Reset(_) => SubmessageId::Reset,
            Self::Fragment(_) => SubmessageId::Fragment,
            Self::Timestamp(_) => SubmessageId::Timestamp,
            Self::TimestampReply(_) => SubmessageId::TimestampReply,
        }
    }

    fn write_payload(&self, w: &mut CdrWriter) {
        match self {
            Self::CreateClient(p) => p.write(w),
            Self::Create(p) => p.write(w),
            Self::GetInfo(p) => p.write(w),
            Self::Delete(p) => p.write(w),
            Self::StatusAgent(p) => p.write(w),
            Self::Status(p) => p.write(w),
            Self::Info(p) => p.write(w),
            Self::WriteData(p) => p.write(w),
            Self::ReadData(p) => p.write(w),
            Self::Data(p) => p.write(w),
            Self::Acknack(p) => p.write(w),
            Self::Heartbeat(p) => p.write(w),
            Self::Reset(p) => p.write(w),
            Self::Fragment(p) => p.write(w),
            Self::Timestamp(p) => p.write(w),
            Self::TimestampReply(p) => p.write(w),
        }
    }
}

/// Encode one submessage into `(id, flags, payload_bytes)`.
pub fn encode_submessage(sub: &Submessage, little_endian: bool) -> (u8, u8, Vec<u8>) {
    let mut flags = if little_endian { 0 } else { FLAG_BIG_ENDIAN };
    if let Submessage::Fragment(f) = sub {
        if f.last {
            flags |= FLAG_FRAGMENT_LAST;
        }
    }
    let mut payload = Vec::new();
    {
        let mut w = CdrWriter::new(&mut payload, 0, little_endian);
        sub.write_payload(&mut w);
    }
    (sub.id().as_u8(), flags, payload)
}

/// Decode one submessage from its id, flags and raw payload bytes.
pub fn decode_submessage(id: u8, flags: u8, payload: &[u8]) -> Result<Submessage, XrceError> {
    let little_endian = flags & FLAG_BIG_ENDIAN == 0;
    let mut r = CdrReader::new(payload, little_endian);
    Ok(match SubmessageId::from_u8(id)? {
        SubmessageId::CreateClient => Submessage::CreateClient(CreateClientPayload::read(&mut r)?),
        SubmessageId::Create => Submessage::Create(CreatePayload::read(&mut r)?),
        SubmessageId::GetInfo => Submessage::GetInfo(GetInfoPayload::read(&mut r)?),
        SubmessageId::Delete => Submessage::Delete(DeletePayload::read(&mut r)?),
        SubmessageId::StatusAgent => Submessage::StatusAgent(StatusAgentPayload::read(&mut r)?),
        SubmessageId::Status => Submessage::Status(StatusPayload::read(&mut r)?),
        SubmessageId::Info => Submessage::Info(InfoPayload::read(&mut r)?),
        SubmessageId::WriteData => Submessage::WriteData(WriteDataPayload::read(&mut r)?),
        SubmessageId::ReadData => Submessage::ReadData(ReadDataPayload::read(&mut r)?),
        SubmessageId::Data => Submessage::Data(DataPayload::read(&mut r)?),
        SubmessageId::Acknack => Submessage::Acknack(AcknackPayload::read(&mut r)?),
        SubmessageId::Heartbeat => Submessage::Heartbeat(HeartbeatPayload::read(&mut r)?),
        SubmessageId::Reset => Submessage::Reset(ResetPayload::read(&mut r)?),
        SubmessageId::Fragment => {
            let mut p = FragmentPayload::read(&mut r)?;
            p.last = flags & FLAG_FRAGMENT_LAST != 0;
            Submessage::Fragment(p)
        }
        SubmessageId::Timestamp => Submessage::Timestamp(TimestampPayload::read(&mut r)?),
        SubmessageId::TimestampReply => {
            Submessage::TimestampReply(TimestampReplyPayload::read(&mut r)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: WirePayload + std::fmt::Debug + PartialEq>(v: T) {
        let mut buf = Vec::new();
        {
            let mut w = CdrWriter::new(&mut buf, 0, true);
            v.write(&mut w);
        }
        assert_eq!(buf.len(), v.serialized_size(0));
        let mut r = CdrReader::new(&buf, true);
        let back = T::read(&mut r).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn create_client_roundtrip() {
        roundtrip(CreateClientPayload {
            request_id: RequestId(7),
            client_key: ClientKey([0xF1, 0xF2, 0xF3, 0xF4]),
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![("a".into(), "b".into())],
        });
    }

    #[test]
    fn create_payload_roundtrip_by_ref() {
        roundtrip(CreatePayload {
            request_id: RequestId(1),
            object_id: ObjectId::new(1, crate::wire::ObjectKind::Participant),
            parent_ids: vec![],
            creation_mode: CreationMode {
                reuse: false,
                replace: false,
            },
            representation: ObjectRepresentation::ByRef("default_xrce_participant".into()),
        });
    }

    #[test]
    fn status_roundtrip() {
        roundtrip(StatusPayload {
            related_request: RequestId(3),
            object_id: ObjectId::new(1, crate::wire::ObjectKind::Topic),
            result: StatusValue::AlreadyExistsError,
        });
    }

    #[test]
    fn heartbeat_and_acknack_roundtrip() {
        roundtrip(HeartbeatPayload {
            first_unacked: 3,
            last_sent: 10,
        });
        roundtrip(AcknackPayload {
            first_unacked: 3,
            nack_bitmap: 0b0001_0001,
        });
    }

    #[test]
    fn fragment_last_flag_via_submessage_flags() {
        let sub = Submessage::Fragment(FragmentPayload {
            fragment_nr: 4,
            last: true,
            data: vec![1, 2, 3],
        });
        let (id, flags, payload) = encode_submessage(&sub, true);
        assert_eq!(flags & FLAG_FRAGMENT_LAST, FLAG_FRAGMENT_LAST);
        let decoded = decode_submessage(id, flags, &payload).unwrap();
        match decoded {
            Submessage::Fragment(p) => {
                assert!(p.last);
                assert_eq!(p.fragment_nr, 4);
                assert_eq!(p.data, vec![1, 2, 3]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_submessage_id_errors() {
        assert!(matches!(
            decode_submessage(0xFE, 0, &[]),
            Err(XrceError::UnknownSubmessageId(0xFE))
        ));
    }

    #[test]
    fn object_representation_same_form() {
        let a = ObjectRepresentation::ByRef("x".into());
        let b = ObjectRepresentation::ByRef("x".into());
        let c = ObjectRepresentation::ByRef("y".into());
        assert!(a.same_form_as(&b));
        assert!(!a.same_form_as(&c));
    }
}
