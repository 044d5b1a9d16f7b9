// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Submessage dispatch: turns one decoded inbound submessage (plus whatever
// per-stream bookkeeping it implies) into zero or more outbound submessages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace, warn};

use crate::message::{InputMessage, MessageHeader};
use crate::middleware::Middleware;
use crate::proxy_client::{classify_liveliness, Liveliness, ProxyClient};
use crate::readjob::ReadJob;
use crate::root::Root;
use crate::submessage::{
    AgentInfo, CreateClientPayload, CreatePayload, DeletePayload, GetInfoPayload, InfoPayload,
    ReadDataPayload, StatusAgentPayload, StatusPayload, StatusValue, Submessage,
    TimestampReplyPayload, WriteDataPayload,
};
use crate::wire::{ClientKey, ObjectKind, RequestId, StreamId, StreamKindTag};

/// Something the engine should send on a specific output stream.
///
/// `Retransmit` carries the exact bytes [`Stream::on_acknack`] returned from
/// retention, at their original sequence number — it must bypass
/// [`crate::streams::Stream::send`] rather than being re-encoded and handed
/// a fresh sequence number, or the retransmit would desynchronize the
/// receiver's reassembly/ordering state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Fresh(StreamId, Submessage),
    Retransmit(StreamId, u16, Vec<u8>),
}

fn reply_stream_for(inbound: StreamId) -> StreamId {
    match inbound.kind() {
        StreamKindTag::Reliable => StreamId::BUILTIN_RELIABLE,
        StreamKindTag::BestEffort | StreamKindTag::None => StreamId::BUILTIN_BEST_EFFORT,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drives the request/reply half of the protocol (the submessage dispatch
/// table) and owns the live READ_DATA jobs across all clients.
pub struct Processor {
    middleware: Arc<dyn Middleware>,
    read_jobs: Mutex<HashMap<(ClientKey, RequestId), ReadJob>>,
}

impl Processor {
    pub fn new(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            middleware,
            read_jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Process every submessage in `input`, in order. Stops at the first
    /// malformed submessage (unknown id, truncated payload, ...) without
    /// tearing down the session.
    pub fn process_message(
        &self,
        root: &Root,
        header: &MessageHeader,
        input: &mut InputMessage,
    ) -> Vec<Outbound> {
        let mut out = Vec::new();
        loop {
            match input.prepare_next_submessage() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!("malformed message framing from {:?}: {e}", header.client_key);
                    break;
                }
            }
            let sub = match input.current_submessage() {
                Ok(s) => s,
                Err(e) => {
                    warn!("discarding rest of message from {:?}: {e}", header.client_key);
                    break;
                }
            };
            out.extend(self.dispatch(root, header, &sub));
        }
        out
    }

    /// Dispatch one already-decoded submessage.
    pub fn dispatch(&self, root: &Root, header: &MessageHeader, sub: &Submessage) -> Vec<Outbound> {
        let reply_stream = reply_stream_for(header.stream_id);
        match sub {
            Submessage::CreateClient(p) => vec![self.handle_create_client(root, p)],
            Submessage::GetInfo(p) => vec![self.handle_get_info(p, reply_stream)],
            Submessage::Create(p) => self.with_client(root, header, |client| {
                let status = client.graph().create(self.middleware.as_ref(), p);
                vec![Outbound::Fresh(
                    reply_stream,
                    Submessage::Status(StatusPayload {
                        related_request: p.request_id,
                        object_id: p.object_id,
                        result: status,
                    }),
                )]
            }),
            Submessage::Delete(p) => self.handle_delete(root, header, p, reply_stream),
            Submessage::WriteData(p) => self.handle_write_data(root, header, p),
            Submessage::ReadData(p) => self.handle_read_data(root, header, p, reply_stream),
            Submessage::Acknack(ack) => self.with_stream(root, header, |stream| {
                stream
                    .on_acknack(ack)
                    .into_iter()
                    .map(|(seq, bytes)| Outbound::Retransmit(header.stream_id, seq, bytes))
                    .collect()
            }),
            Submessage::Heartbeat(hb) => self.with_stream(root, header, |stream| {
                stream
                    .on_heartbeat(hb)
                    .into_iter()
                    .map(|ack| Outbound::Fresh(StreamId::NONE, Submessage::Acknack(ack)))
                    .collect()
            }),
            Submessage::Reset(_) => self.handle_reset(root, header),
            Submessage::Fragment(frag) => self.handle_fragment(root, header, frag),
            Submessage::Timestamp(ts) => vec![Outbound::Fresh(
                reply_stream,
                Submessage::TimestampReply(TimestampReplyPayload {
                    originator_transmit_timestamp: ts.transmit_timestamp,
                    receive_timestamp: now_millis(),
                    transmit_timestamp: now_millis(),
                }),
            )],
            // Replies we only ever send, never interpret.
            Submessage::StatusAgent(_)
            | Submessage::Status(_)
            | Submessage::Info(_)
            | Submessage::Data(_)
            | Submessage::TimestampReply(_) => {
                trace!("ignoring reply-only submessage from client");
                Vec::new()
            }
        }
    }

    fn with_client<F>(&self, root: &Root, header: &MessageHeader, f: F) -> Vec<Outbound>
    where
        F: FnOnce(&Arc<ProxyClient>) -> Vec<Outbound>,
    {
        match root.get_client(header.client_key) {
            Some(client) => f(&client),
            None => {
                debug!("message for unknown client {:?}", header.client_key);
                Vec::new()
            }
        }
    }

    fn with_stream<F>(&self, root: &Root, header: &MessageHeader, f: F) -> Vec<Outbound>
    where
        F: FnOnce(&mut crate::streams::Stream) -> Vec<Outbound>,
    {
        self.with_client(root, header, |client| {
            let stream_lock = client.stream(header.stream_id);
            let mut stream = stream_lock.lock().unwrap();
            f(&mut stream)
        })
    }

    fn handle_create_client(&self, root: &Root, p: &CreateClientPayload) -> Outbound {
        let (result, agent_info) = root.create_client(p);
        Outbound::Fresh(
            StreamId::BUILTIN_BEST_EFFORT,
            Submessage::StatusAgent(StatusAgentPayload {
                related_request: p.request_id,
                result,
                agent_info,
            }),
        )
    }

    fn handle_get_info(&self, p: &GetInfoPayload, reply_stream: StreamId) -> Outbound {
        Outbound::Fresh(
            reply_stream,
            Submessage::Info(InfoPayload {
                related_request: p.request_id,
                agent_info: AgentInfo::this_agent(),
            }),
        )
    }

    fn handle_delete(
        &self,
        root: &Root,
        header: &MessageHeader,
        p: &DeletePayload,
        reply_stream: StreamId,
    ) -> Vec<Outbound> {
        let status = if matches!(p.object_id.kind(), Ok(ObjectKind::Client)) {
            self.cancel_jobs_for(header.client_key);
            if root.delete_client(header.client_key) {
                StatusValue::Ok
            } else {
                StatusValue::UnknownReferenceError
            }
        } else {
            match root.get_client(header.client_key) {
                Some(client) => client.graph().delete_object(self.middleware.as_ref(), p.object_id),
                None => StatusValue::UnknownReferenceError,
            }
        };
        vec![Outbound::Fresh(
            reply_stream,
            Submessage::Status(StatusPayload {
                related_request: p.request_id,
                object_id: p.object_id,
                result: status,
            }),
        )]
    }

    fn handle_write_data(
        &self,
        root: &Root,
        header: &MessageHeader,
        p: &WriteDataPayload,
    ) -> Vec<Outbound> {
        if let Some(client) = root.get_client(header.client_key) {
            if let Err(e) = client.graph().write(self.middleware.as_ref(), p.writer_id, &p.data) {
                warn!("WRITE_DATA to {:?} failed: {e}", p.writer_id);
            }
        }
        Vec::new()
    }

    fn handle_read_data(
        &self,
        root: &Root,
        header: &MessageHeader,
        p: &ReadDataPayload,
        reply_stream: StreamId,
    ) -> Vec<Outbound> {
        let handle = root
            .get_client(header.client_key)
            .and_then(|client| client.graph().handle_of(p.reader_id));
        match handle {
            Some(handle) => {
                let job = ReadJob::new(p, handle);
                self.read_jobs
                    .lock()
                    .unwrap()
                    .insert((header.client_key, p.request_id), job);
                Vec::new()
            }
            None => vec![Outbound::Fresh(
                reply_stream,
                Submessage::Status(StatusPayload {
                    related_request: p.request_id,
                    object_id: p.reader_id,
                    result: StatusValue::UnknownReferenceError,
                }),
            )],
        }
    }

    fn handle_reset(&self, root: &Root, header: &MessageHeader) -> Vec<Outbound> {
        self.with_client(root, header, |client| {
            if header.stream_id == StreamId::NONE {
                client.reset_all_streams();
            } else {
                let stream_lock = client.stream(header.stream_id);
                stream_lock.lock().unwrap().reset();
            }
            Vec::new()
        })
    }

    /// Fragments carry a whole inner submessage (its own 4-byte header plus
    /// payload) split across the FRAGMENT payloads; the header is only
    /// available once reassembly completes, so re-dispatch happens here
    /// rather than in `prepare_next_submessage`.
    fn handle_fragment(
        &self,
        root: &Root,
        header: &MessageHeader,
        frag: &crate::submessage::FragmentPayload,
    ) -> Vec<Outbound> {
        self.with_client(root, header, |client| {
            let stream_lock = client.stream(header.stream_id);
            let mut stream = stream_lock.lock().unwrap();
            let Some(reassembler) = stream.reassembler_mut() else {
                return Vec::new();
            };
            match reassembler.feed(&frag.data, frag.last) {
                Some(bytes) => decode_reassembled(&bytes)
                    .into_iter()
                    .flat_map(|s| self.dispatch(root, header, &s))
                    .collect(),
                None => Vec::new(),
            }
        })
    }

    fn cancel_jobs_for(&self, key: ClientKey) {
        self.read_jobs.lock().unwrap().retain(|(k, _), job| {
            if *k == key {
                job.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Poll every still-pending READ_DATA job once; returns their DATA
    /// submessages grouped by the client they belong to.
    pub fn poll_read_jobs(&self) -> Vec<(ClientKey, Vec<Outbound>)> {
        let mut jobs = self.read_jobs.lock().unwrap();
        jobs.retain(|_, job| !job.is_done());
        let mut by_client: HashMap<ClientKey, Vec<Outbound>> = HashMap::new();
        for ((key, _), job) in jobs.iter_mut() {
            if !job.ready_to_poll() {
                continue;
            }
            for payload in job.poll(self.middleware.as_ref()) {
                by_client.entry(*key).or_default().push(Outbound::Fresh(
                    job.preferred_stream_id,
                    Submessage::Data(crate::submessage::DataPayload {
                        reader_id: job.reader_id,
                        data: payload,
                    }),
                ));
            }
        }
        by_client.into_iter().collect()
    }

    /// Synthesize HEARTBEATs on every reliable output stream of every live
    /// client, per the configured heartbeat period.
    pub fn tick_heartbeats(&self, root: &Root) -> Vec<(ClientKey, Vec<Outbound>)> {
        let mut out = Vec::new();
        for client in root.snapshot() {
            let mut client_out = Vec::new();
            for id in client.stream_ids() {
                let stream_id = StreamId(id);
                if stream_id.kind() != StreamKindTag::Reliable {
                    continue;
                }
                let stream_lock = client.stream(stream_id);
                let stream = stream_lock.lock().unwrap();
                if let Some(hb) = stream.make_heartbeat() {
                    client_out.push(Outbound::Fresh(stream_id, Submessage::Heartbeat(hb)));
                }
            }
            if !client_out.is_empty() {
                out.push((client.client_key, client_out));
            }
        }
        out
    }

    /// Classify every client's liveliness; destroys `ToRemove` clients and
    /// returns heartbeat probes to send to `Dead` ones.
    pub fn scan_liveliness(
        &self,
        root: &Root,
        dead_threshold: std::time::Duration,
        probe_interval: std::time::Duration,
        remove_attempts: u32,
    ) -> Vec<(ClientKey, Vec<Outbound>)> {
        let mut out = Vec::new();
        for client in root.snapshot() {
            let elapsed = client.elapsed_since_activity();
            match classify_liveliness(elapsed, dead_threshold, probe_interval, remove_attempts) {
                Liveliness::Alive => {}
                Liveliness::Dead => {
                    let mut probes = Vec::new();
                    for id in client.stream_ids() {
                        let stream_id = StreamId(id);
                        if stream_id.kind() != StreamKindTag::Reliable {
                            continue;
                        }
                        let stream_lock = client.stream(stream_id);
                        let stream = stream_lock.lock().unwrap();
                        if let Some(hb) = stream.make_heartbeat() {
                            probes.push(Outbound::Fresh(stream_id, Submessage::Heartbeat(hb)));
                        }
                    }
                    if !probes.is_empty() {
                        out.push((client.client_key, probes));
                    }
                }
                Liveliness::ToRemove => {
                    debug!("removing unresponsive client {:?}", client.client_key);
                    self.cancel_jobs_for(client.client_key);
                    root.delete_client(client.client_key);
                }
            }
        }
        out
    }
}

fn decode_reassembled(bytes: &[u8]) -> Option<Submessage> {
    if bytes.len() < crate::message::SUBMESSAGE_HEADER_SIZE {
        warn!("reassembled fragment too short for a submessage header");
        return None;
    }
    let id = bytes[0];
    let flags = bytes[1];
    let length = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let payload = &bytes[crate::message::SUBMESSAGE_HEADER_SIZE..];
    if payload.len() < length {
        warn!("reassembled fragment shorter than its declared length");
        return None;
    }
    match crate::submessage::decode_submessage(id, flags, &payload[..length]) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("failed to decode reassembled submessage: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::NullMiddleware;
    use crate::submessage::{CreationMode, ObjectRepresentation, XRCE_COOKIE, XRCE_VERSION};
    use crate::wire::SessionId;

    fn header(key: [u8; 4], stream: u8) -> MessageHeader {
        MessageHeader {
            client_key: ClientKey(key),
            session_id: SessionId(128),
            stream_id: StreamId(stream),
            sequence_nr: 0,
        }
    }

    fn processor() -> Processor {
        Processor::new(Arc::new(NullMiddleware::new()))
    }

    #[test]
    fn create_client_round_trip_produces_status_agent() {
        let proc = processor();
        let root = Root::new(8, 16);
        let p = CreateClientPayload {
            request_id: RequestId(1),
            client_key: ClientKey([9, 9, 9, 9]),
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        };
        let out = proc.dispatch(&root, &header([9, 9, 9, 9], 0), &Submessage::CreateClient(p));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::Fresh(_, Submessage::StatusAgent(s)) => assert_eq!(s.result, StatusValue::Ok),
            _ => panic!("expected StatusAgent"),
        }
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn create_then_delete_object() {
        let proc = processor();
        let root = Root::new(8, 16);
        let key = ClientKey([1, 1, 1, 1]);
        root.create_client(&CreateClientPayload {
            request_id: RequestId(0),
            client_key: key,
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        });

        let hdr = header([1, 1, 1, 1], 128);
        let create = CreatePayload {
            request_id: RequestId(1),
            object_id: crate::wire::ObjectId::new(1, ObjectKind::Participant),
            parent_ids: vec![],
            creation_mode: CreationMode::default(),
            representation: ObjectRepresentation::ByRef("default_xrce_participant".into()),
        };
        let out = proc.dispatch(&root, &hdr, &Submessage::Create(create.clone()));
        match &out[0] {
            Outbound::Fresh(_, Submessage::Status(s)) => assert_eq!(s.result, StatusValue::Ok),
            _ => panic!("expected Status"),
        }

        let del = DeletePayload {
            request_id: RequestId(2),
            object_id: create.object_id,
        };
        let out = proc.dispatch(&root, &hdr, &Submessage::Delete(del));
        match &out[0] {
            Outbound::Fresh(_, Submessage::Status(s)) => assert_eq!(s.result, StatusValue::Ok),
            _ => panic!("expected Status"),
        }
    }

    #[test]
    fn delete_client_kind_tears_down_session() {
        let proc = processor();
        let root = Root::new(8, 16);
        let key = ClientKey([2, 2, 2, 2]);
        root.create_client(&CreateClientPayload {
            request_id: RequestId(0),
            client_key: key,
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        });
        let hdr = header([2, 2, 2, 2], 128);
        let del = DeletePayload {
            request_id: RequestId(1),
            object_id: crate::wire::ObjectId::new(1, ObjectKind::Client),
        };
        proc.dispatch(&root, &hdr, &Submessage::Delete(del));
        assert!(root.get_client(key).is_none());
    }

    #[test]
    fn heartbeat_on_input_triggers_acknack_reply() {
        let proc = processor();
        let root = Root::new(8, 16);
        let key = ClientKey([3, 3, 3, 3]);
        root.create_client(&CreateClientPayload {
            request_id: RequestId(0),
            client_key: key,
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        });
        let hdr = header([3, 3, 3, 3], 128);
        let hb = crate::submessage::HeartbeatPayload {
            first_unacked: 0,
            last_sent: 0,
        };
        let out = proc.dispatch(&root, &hdr, &Submessage::Heartbeat(hb));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Outbound::Fresh(stream_id, Submessage::Acknack(_)) => {
                assert_eq!(*stream_id, StreamId::NONE);
            }
            other => panic!("expected Acknack on stream 0, got {other:?}"),
        }
    }

    #[test]
    fn liveliness_scan_removes_stale_client() {
        let proc = processor();
        let root = Root::new(8, 16);
        let key = ClientKey([4, 4, 4, 4]);
        root.create_client(&CreateClientPayload {
            request_id: RequestId(0),
            client_key: key,
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            requested_session_id: SessionId(0x81),
            properties: vec![],
        });
        // already far beyond any sane threshold
        let zero = std::time::Duration::from_nanos(1);
        proc.scan_liveliness(&root, zero, zero, 1);
        // first scan only reaches Dead/ToRemove once elapsed > thresholds;
        // elapsed since `touch()` is >0ns immediately, so with nanosecond
        // thresholds this client is already ToRemove.
        assert!(root.get_client(key).is_none());
    }
}
